// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit, constructor-supplied parameters.
//!
//! Nothing here is parsed from a process-wide config file; that parsing is
//! an external collaborator's job. Callers build these structs directly.

/// Parameters for one `pipeline::Pipeline`.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
	/// Number of entry-buffers circulating between the three queues.
	pub num_buffers: usize,
	/// Capacity, in entries, of a single buffer.
	pub buffer_capacity: usize,
	/// Number of sort threads.
	pub num_sort_threads: usize,
}

impl Default for PipelineOptions {
	fn default() -> Self {
		PipelineOptions { num_buffers: 4, buffer_capacity: 1 << 16, num_sort_threads: 2 }
	}
}

/// Parameters for `importer::Importer`.
#[derive(Clone, Debug)]
pub struct ImportOptions {
	/// Total memory budget in bytes, used to size pipeline buffers.
	pub memory_budget_bytes: u64,
	/// Requested number of worker threads; `1` forces
	/// the sequential strategy.
	pub num_threads: usize,
}

impl Default for ImportOptions {
	fn default() -> Self {
		ImportOptions { memory_budget_bytes: 1 << 30, num_threads: 1 }
	}
}

/// Parameters for `partition::Partition::merge_all`/`replicate_merge_all`.
#[derive(Clone, Debug)]
pub struct MergeOptions {
	/// Zero, one or two scratch directories used by the merge plan.
	pub temp_dirs: Vec<std::path::PathBuf>,
	/// Byte budget used to group files into bounded-temp-space merge groups.
	/// `None` merges every input file in one pass.
	pub temp_space_budget: Option<u64>,
	/// Granularity of the range index built for the merge's output file.
	pub index_granularity: usize,
}

pub const DEFAULT_INDEX_GRANULARITY: usize = 1024;

impl Default for MergeOptions {
	fn default() -> Self {
		MergeOptions { temp_dirs: Vec::new(), temp_space_budget: None, index_granularity: DEFAULT_INDEX_GRANULARITY }
	}
}

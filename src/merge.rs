// SPDX-License-Identifier: MIT OR Apache-2.0

//! External merge, grounded on
//! `original_source/src/persistence/pos_db/OrderedEntrySetPositionDatabase.h`:
//! a partition's run files are grouped into consecutive runs bounded by
//! `MergeOptions::temp_space_budget`, and each group is merged with a
//! tournament (min-heap) pass that also de-duplicates full-equal keys via
//! [`crate::format::Entry::combine`], emitting one new, still-sorted run file
//! and a freshly built [`crate::index::RangeIndex`] over it, in place of the
//! group's inputs. `replicate_merge_all` runs the same merge but writes its
//! output to a separate directory instead of replacing the partition in
//! place, with a fast-path plain copy when the partition is already a single
//! file.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::display::hex;
use crate::error::Result;
use crate::format::Entry;
use crate::index::RangeIndex;
use crate::options::MergeOptions;
use crate::partition::{Opened, Partition};
use crate::run_file::{self, RunFile, RunId};

struct Cursor<E: Entry> {
	entries: Vec<E>,
	next: usize,
}

impl<E: Entry> Cursor<E> {
	fn peek(&self) -> Option<&E> {
		self.entries.get(self.next)
	}
	fn advance(&mut self) -> E {
		let e = self.entries[self.next];
		self.next += 1;
		e
	}
}

struct HeapItem<E: Entry> {
	key: crate::entry::Key,
	source: usize,
	_marker: std::marker::PhantomData<E>,
}

impl<E: Entry> PartialEq for HeapItem<E> {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}
impl<E: Entry> Eq for HeapItem<E> {}
impl<E: Entry> PartialOrd for HeapItem<E> {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl<E: Entry> Ord for HeapItem<E> {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.key.cmp(&other.key)
	}
}

/// Reports how much of a merge plan has completed, in entries. `work_total` only counts groups with more than one
/// input file; single-file groups are no-ops and never reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeProgress {
	pub work_done: u64,
	pub work_total: u64,
}

/// Splits a partition's open run files into consecutive groups whose total
/// entry-byte size stays under `budget`. A
/// single file larger than `budget` still forms its own group rather than
/// being rejected. `None` merges the whole partition in one group, matching
/// the unbounded behaviour the on-disk format has always had.
fn group_by_budget<E: Entry>(opened: &[Arc<Opened<E>>], budget: Option<u64>) -> Vec<Vec<Arc<Opened<E>>>> {
	let budget = match budget {
		Some(budget) => budget,
		None => return vec![opened.to_vec()],
	};
	let mut groups = Vec::new();
	let mut current: Vec<Arc<Opened<E>>> = Vec::new();
	let mut current_bytes = 0u64;
	for o in opened {
		let bytes = o.run().len() * E::SIZE as u64;
		if !current.is_empty() && current_bytes.saturating_add(bytes) > budget {
			groups.push(std::mem::take(&mut current));
			current_bytes = 0;
		}
		current_bytes += bytes;
		current.push(o.clone());
	}
	if !current.is_empty() {
		groups.push(current);
	}
	groups
}

/// Tournament-merges one group's run files into a single sorted, de-duplicated
/// vector.
fn merge_group<E: Entry>(group: &[Arc<Opened<E>>]) -> Vec<E> {
	let mut cursors: Vec<Cursor<E>> = group.iter().map(|o| Cursor { entries: o.run().iter().collect(), next: 0 }).collect();

	let mut heap: BinaryHeap<Reverse<HeapItem<E>>> = BinaryHeap::new();
	for (i, cursor) in cursors.iter().enumerate() {
		if let Some(entry) = cursor.peek() {
			heap.push(Reverse(HeapItem { key: entry.key(), source: i, _marker: std::marker::PhantomData }));
		}
	}

	let mut merged: Vec<E> = Vec::new();
	while let Some(Reverse(item)) = heap.pop() {
		let entry = cursors[item.source].advance();
		if let Some(next) = cursors[item.source].peek() {
			heap.push(Reverse(HeapItem { key: next.key(), source: item.source, _marker: std::marker::PhantomData }));
		}
		match merged.last_mut() {
			Some(last) if last.key().full_equal(&entry.key()) => last.combine(&entry),
			_ => merged.push(entry),
		}
	}
	merged
}

/// Moves a freshly written file into place, preferring a rename and falling
/// back to copy-then-remove across filesystem boundaries (relevant once
/// `temp_dirs` points somewhere other than the partition's own directory).
fn move_into_place(from: &Path, to: &Path) -> Result<()> {
	if std::fs::rename(from, to).is_ok() {
		return Ok(());
	}
	std::fs::copy(from, to)?;
	std::fs::remove_file(from)?;
	Ok(())
}

/// Writes `entries` as a run file under the partition's transient name,
/// staging the write in `staging_dir` before moving the result into
/// `partition`'s own directory. `staging_dir` of `None` writes directly in
/// place. Either way the merged output lands under a non-numeric name that
/// `Partition::discover` never picks up; `Partition::replace_group` renames
/// it to its final id only after the group's old inputs are unlinked, so a
/// crash in between never leaves both old and new data live.
fn write_staged<E: Entry>(partition: &Partition<E>, staging_dir: Option<&Path>, entries: &[E], index_granularity: u64) -> Result<()> {
	let transient_data = partition.dir().join(run_file::transient_data_name());
	let transient_index = partition.dir().join(run_file::transient_index_name());
	match staging_dir {
		None => {
			let run = RunFile::create_at(&transient_data, entries)?;
			let index = RangeIndex::build(&run, index_granularity);
			index.write_to_path(&transient_index)?;
		}
		Some(staging) => {
			std::fs::create_dir_all(staging)?;
			let staged_data = staging.join(run_file::transient_data_name());
			let staged_index = staging.join(run_file::transient_index_name());
			let run = RunFile::create_at(&staged_data, entries)?;
			let index = RangeIndex::build(&run, index_granularity);
			index.write_to_path(&staged_index)?;
			drop(run);
			move_into_place(&staged_data, &transient_data)?;
			move_into_place(&staged_index, &transient_index)?;
		}
	}
	Ok(())
}

/// Merges `partition`'s run files per `options`, reporting progress as it
/// goes. Groups of a single file are left untouched; every other group is
/// tournament-merged and swapped in under one new id.
pub fn merge_all_with_progress<E: Entry>(partition: &Partition<E>, options: &MergeOptions, mut progress: impl FnMut(MergeProgress)) -> Result<()> {
	let opened = partition.snapshot();
	if opened.len() <= 1 {
		return Ok(());
	}

	let groups = group_by_budget(&opened, options.temp_space_budget);
	let work_total: u64 = groups.iter().filter(|g| g.len() > 1).map(|g| g.iter().map(|o| o.run().len()).sum::<u64>()).sum();
	log::info!(target: "chesspos_db", "merging partition {}: {} file(s) in {} group(s), {} entries to merge", partition.dir().display(), opened.len(), groups.len(), work_total);

	let mut work_done = 0u64;
	let staging_dir = options.temp_dirs.first().map(PathBuf::as_path);
	for group in groups {
		if group.len() <= 1 {
			continue;
		}
		let old_ids: Vec<RunId> = group.iter().map(|o| o.run().id()).collect();
		log::debug!(target: "chesspos_db", "merging run group {:?}", old_ids);
		let merged = merge_group(&group);
		write_staged(partition, staging_dir, &merged, options.index_granularity.max(1) as u64)?;
		let new_id = partition.replace_group(&old_ids)?;
		work_done += merged.len() as u64;
		log::debug!(target: "chesspos_db", "run group {:?} replaced by {} ({} entries)", old_ids, new_id, merged.len());
		progress(MergeProgress { work_done, work_total });
	}
	log::info!(target: "chesspos_db", "merge of partition {} complete", partition.dir().display());
	Ok(())
}

/// Merges every run file currently in `partition` per `options`, without a
/// progress callback.
pub fn merge_all<E: Entry>(partition: &Partition<E>, options: &MergeOptions) -> Result<()> {
	merge_all_with_progress(partition, options, |_| {})
}

/// Writes a merged replica of `partition` into `out_dir` instead of replacing
/// the partition in place. A single-file partition
/// is just copied across; anything else goes through the same tournament
/// merge as [`merge_all`], always collapsing to one output file since there
/// is no existing directory structure in `out_dir` to preserve groups within.
pub fn replicate_merge_all<E: Entry>(partition: &Partition<E>, out_dir: &Path, options: &MergeOptions, mut progress: impl FnMut(MergeProgress)) -> Result<()> {
	std::fs::create_dir_all(out_dir)?;
	let opened = partition.snapshot();

	if opened.len() <= 1 {
		if let Some(o) = opened.first() {
			log::debug!(target: "chesspos_db", "replicate {}: single file fast path, id {}", partition.dir().display(), o.run().id());
			std::fs::copy(o.run().path(), out_dir.join(run_file::data_file_name(o.run().id())))?;
			std::fs::copy(partition.dir().join(run_file::index_file_name(o.run().id())), out_dir.join(run_file::index_file_name(o.run().id())))?;
			progress(MergeProgress { work_done: o.run().len(), work_total: o.run().len() });
		}
		return Ok(());
	}

	log::info!(target: "chesspos_db", "replicating merged partition {} into {}", partition.dir().display(), out_dir.display());
	let merged = merge_group(&opened);
	let work_total = merged.len() as u64;
	let staging_dir = options.temp_dirs.first().map(PathBuf::as_path);
	let id: RunId = 0;
	match staging_dir {
		None => {
			let run = RunFile::create(out_dir, id, &merged)?;
			let index = RangeIndex::build(&run, options.index_granularity.max(1) as u64);
			index.write(out_dir, id)?;
		}
		Some(staging) => {
			std::fs::create_dir_all(staging)?;
			let run = RunFile::create(staging, id, &merged)?;
			let index = RangeIndex::build(&run, options.index_granularity.max(1) as u64);
			index.write(staging, id)?;
			drop(run);
			move_into_place(&staging.join(run_file::data_file_name(id)), &out_dir.join(run_file::data_file_name(id)))?;
			move_into_place(&staging.join(run_file::index_file_name(id)), &out_dir.join(run_file::index_file_name(id)))?;
		}
	}
	progress(MergeProgress { work_done: work_total, work_total });
	log::info!(target: "chesspos_db", "replicate of {} complete: {} entries, key prefix {}", partition.dir().display(), work_total, merged.first().map(|e| hex(&e.key().hash.to_le_bytes())).unwrap_or_default());
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::entry::{GameResult, Key, Level};
	use crate::format::epsilon::EpsilonEntry;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("merge");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}
	}
	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	#[test]
	fn merge_combines_duplicate_keys_across_files_and_preserves_total_count() {
		let dir = TempDir::new("merge_combines_duplicate_keys_across_files_and_preserves_total_count");
		let partition: Partition<EpsilonEntry> = Partition::open(&dir.0).unwrap();

		let batch_a: Vec<EpsilonEntry> = vec![1u64, 2, 4]
			.into_iter()
			.map(|h| EpsilonEntry::new_single(Key::simple(h, None, Level::Human, GameResult::Draw), None, None))
			.collect();
		let batch_b: Vec<EpsilonEntry> = vec![2u64, 3, 4]
			.into_iter()
			.map(|h| EpsilonEntry::new_single(Key::simple(h, None, Level::Human, GameResult::Draw), None, None))
			.collect();
		partition.store_sorted(&batch_a).unwrap();
		partition.store_sorted(&batch_b).unwrap();

		merge_all(&partition, &MergeOptions::default()).unwrap();

		let opened = partition.snapshot();
		assert_eq!(opened.len(), 1);
		let entries: Vec<EpsilonEntry> = opened[0].run().iter().collect();
		assert_eq!(entries.len(), 4);
		let total: u64 = entries.iter().map(|e| e.count()).sum();
		assert_eq!(total, 6);
		let duplicate = entries.iter().find(|e| e.key().hash == 2).unwrap();
		assert_eq!(duplicate.count(), 2);
		let duplicate = entries.iter().find(|e| e.key().hash == 4).unwrap();
		assert_eq!(duplicate.count(), 2);
	}

	#[test]
	fn temp_space_budget_groups_files_instead_of_merging_everything_at_once() {
		let dir = TempDir::new("temp_space_budget_groups_files_instead_of_merging_everything_at_once");
		let partition: Partition<EpsilonEntry> = Partition::open(&dir.0).unwrap();

		for h in [1u64, 2, 3] {
			let batch: Vec<EpsilonEntry> = vec![EpsilonEntry::new_single(Key::simple(h, None, Level::Human, GameResult::Draw), None, None)];
			partition.store_sorted(&batch).unwrap();
		}
		assert_eq!(partition.snapshot().len(), 3);

		let one_entry_bytes = EpsilonEntry::SIZE as u64;
		let options = MergeOptions { temp_space_budget: Some(one_entry_bytes * 2), ..MergeOptions::default() };
		let mut progress_calls = Vec::new();
		merge_all_with_progress(&partition, &options, |p| progress_calls.push(p)).unwrap();

		// The first two files (fitting the budget) merge into one; the third,
		// which would overflow it, is left as its own untouched group.
		assert_eq!(partition.snapshot().len(), 2);
		assert_eq!(progress_calls.len(), 1);
		assert_eq!(progress_calls[0].work_done, 2);
		assert_eq!(progress_calls[0].work_total, 2);
	}

	#[test]
	fn replicate_merge_all_copies_a_single_file_partition_without_merging() {
		let dir = TempDir::new("replicate_merge_all_copies_a_single_file_partition_without_merging");
		let out = TempDir::new("replicate_merge_all_copies_a_single_file_partition_without_merging_out");
		let partition: Partition<EpsilonEntry> = Partition::open(&dir.0).unwrap();
		let batch: Vec<EpsilonEntry> = vec![1u64, 2].into_iter().map(|h| EpsilonEntry::new_single(Key::simple(h, None, Level::Human, GameResult::Draw), None, None)).collect();
		partition.store_sorted(&batch).unwrap();

		replicate_merge_all(&partition, &out.0, &MergeOptions::default(), |_| {}).unwrap();

		let replica = RunFile::<EpsilonEntry>::open(&out.0, partition.snapshot()[0].run().id()).unwrap();
		assert_eq!(replica.len(), 2);
	}
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Partition: a directory of run files for one format.
//! `db_alpha` keeps one partition per `(level, result)` pair;
//! every other format keeps a single partition. Modeled on
//! `parity-db`'s `column.rs`'s directory-of-tables ownership, minus resizing
//! (run files never grow once written).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::RwLock;

use crate::error::Result;
use crate::format::Entry;
use crate::index::RangeIndex;
use crate::options::DEFAULT_INDEX_GRANULARITY;
use crate::run_file::{self, RunFile, RunId};

struct Lock(std::fs::File);

impl Lock {
	fn acquire(dir: &Path) -> Result<Lock> {
		std::fs::create_dir_all(dir)?;
		let file = std::fs::OpenOptions::new().write(true).create(true).open(dir.join(".lock"))?;
		file.try_lock_exclusive().map_err(crate::error::Error::Io)?;
		Ok(Lock(file))
	}
}

impl Drop for Lock {
	fn drop(&mut self) {
		let _ = fs2::FileExt::unlock(&self.0);
	}
}

pub(crate) struct Opened<E: Entry> {
	run: RunFile<E>,
	index: RangeIndex,
}

/// A single directory of immutable, sorted run files. Entries
/// written by the store pipeline, or produced by [`crate::merge`], land here
/// under a monotonically increasing id; `snapshot` is what the query engine
/// iterates.
pub struct Partition<E: Entry> {
	dir: PathBuf,
	_lock: Lock,
	files: RwLock<Vec<Arc<Opened<E>>>>,
}

impl<E: Entry> Partition<E> {
	pub fn open(dir: &Path) -> Result<Partition<E>> {
		std::fs::create_dir_all(dir)?;
		let lock = Lock::acquire(dir)?;
		let mut ids = Self::discover(dir)?;
		ids.sort_unstable();
		let mut files = Vec::with_capacity(ids.len());
		for id in ids {
			files.push(Arc::new(Self::open_one(dir, id)?));
		}
		log::debug!(target: "chesspos_db", "opened partition {} with {} run file(s)", dir.display(), files.len());
		Ok(Partition { dir: dir.to_path_buf(), _lock: lock, files: RwLock::new(files) })
	}

	fn open_one(dir: &Path, id: RunId) -> Result<Opened<E>> {
		let run = RunFile::open(dir, id)?;
		let index = match RangeIndex::read(dir, id) {
			Ok(index) => index,
			Err(_) => {
				let index = RangeIndex::build(&run, DEFAULT_INDEX_GRANULARITY as u64);
				index.write(dir, id)?;
				index
			}
		};
		Ok(Opened { run, index })
	}

	/// Scans the directory for run files, skipping the lock file, the
	/// manifest, and sidecar index files.
	fn discover(dir: &Path) -> Result<Vec<RunId>> {
		let mut ids = Vec::new();
		for entry in std::fs::read_dir(dir)? {
			let entry = entry?;
			let name = entry.file_name();
			let name = name.to_string_lossy();
			if let Some(id) = run_file::parse_run_id(&name) {
				ids.push(id);
			}
		}
		Ok(ids)
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// One past the largest existing run id.
	pub fn next_id(&self) -> RunId {
		self.files.read().iter().map(|o| o.run.id()).max().map_or(0, |id| id + 1)
	}

	/// Writes a freshly sorted batch of entries as a new immutable run file
	/// and builds its index.
	pub fn store_sorted(&self, entries: &[E]) -> Result<RunId> {
		let id = self.next_id();
		let run = RunFile::create(&self.dir, id, entries)?;
		let index = RangeIndex::build(&run, DEFAULT_INDEX_GRANULARITY as u64);
		index.write(&self.dir, id)?;
		self.files.write().push(Arc::new(Opened { run, index }));
		log::debug!(target: "chesspos_db", "{}: stored run {} with {} entries", self.dir.display(), id, entries.len());
		Ok(id)
	}

	/// Snapshot of open run files plus their indices, for the query engine
	/// and merge to scan without holding the partition lock for the
	/// duration of the scan.
	pub(crate) fn snapshot(&self) -> Vec<Arc<Opened<E>>> {
		self.files.read().clone()
	}

	/// Drops every run file, used by tests and by a from-scratch reimport.
	pub fn clear(&self) -> Result<()> {
		let mut files = self.files.write();
		log::info!(target: "chesspos_db", "clearing partition {}: dropping {} run file(s)", self.dir.display(), files.len());
		for opened in files.drain(..) {
			let _ = std::fs::remove_file(opened.run.path());
			let _ = std::fs::remove_file(self.dir.join(run_file::index_file_name(opened.run.id())));
		}
		Ok(())
	}

	/// Replaces the full set of open run files after a merge: the old files
	/// are expected to already be unlinked by the merge itself.
	pub fn replace_files(&self, new_ids: Vec<RunId>) -> Result<()> {
		let mut files = self.files.write();
		files.clear();
		for id in new_ids {
			files.push(Arc::new(Self::open_one(&self.dir, id)?));
		}
		Ok(())
	}

	/// Swaps one group of run files for a single replacement staged under
	/// the partition's transient name (`run_file::transient_data_name`),
	/// leaving any other open files untouched. The replacement takes the
	/// smallest id in `old_ids`; its transient files are renamed into place
	/// only after every old id's files are unlinked, so a crash between the
	/// two never leaves both the old inputs and the new file live at once.
	pub fn replace_group(&self, old_ids: &[RunId]) -> Result<RunId> {
		let new_id = *old_ids.iter().min().expect("merge group is non-empty");
		let mut files = self.files.write();
		let mut remaining = Vec::with_capacity(files.len());
		for opened in files.drain(..) {
			if old_ids.contains(&opened.run.id()) {
				std::fs::remove_file(opened.run.path())?;
				std::fs::remove_file(self.dir.join(run_file::index_file_name(opened.run.id())))?;
			} else {
				remaining.push(opened);
			}
		}
		std::fs::rename(self.dir.join(run_file::transient_data_name()), self.dir.join(run_file::data_file_name(new_id)))?;
		std::fs::rename(self.dir.join(run_file::transient_index_name()), self.dir.join(run_file::index_file_name(new_id)))?;
		remaining.push(Arc::new(Self::open_one(&self.dir, new_id)?));
		*files = remaining;
		Ok(new_id)
	}
}

impl<E: Entry> Opened<E> {
	pub(crate) fn run(&self) -> &RunFile<E> {
		&self.run
	}
	pub(crate) fn index(&self) -> &RangeIndex {
		&self.index
	}
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable run file, modeled on `parity-db`'s `table.rs`'s
//! `ValueTable`: a fixed-entry-size file, a tiny header, and `read_at`/
//! `write_at` through `std::os::unix::fs::FileExt`/
//! `std::os::windows::fs::FileExt`. Unlike `ValueTable`, a run file is
//! write-once (built in full by [`crate::merge`] or the store pipeline) and
//! then opened read-only and mapped for scanning.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};
use crate::format::Entry;

const HEADER_SIZE: u64 = 16;
const MAGIC: u64 = 0x5250_4442_3031_0001; // "RPDB01" + version tag

#[cfg(target_os = "macos")]
fn disable_read_ahead(file: &File) -> Result<()> {
	use std::os::unix::io::AsRawFd;
	if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, 0) } == -1 {
		return Err(Error::Io(std::io::Error::last_os_error()));
	}
	Ok(())
}

#[cfg(not(target_os = "macos"))]
fn disable_read_ahead(_file: &File) -> Result<()> {
	Ok(())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	file.read_exact_at(buf, offset).map_err(Error::Io)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	file.write_all_at(buf, offset).map_err(Error::Io)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	let mut read = 0;
	while read < buf.len() {
		let n = file.seek_read(&mut buf[read..], offset + read as u64).map_err(Error::Io)?;
		if n == 0 {
			return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read")));
		}
		read += n;
	}
	Ok(())
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	let mut written = 0;
	while written < buf.len() {
		let n = file.seek_write(&buf[written..], offset + written as u64).map_err(Error::Io)?;
		written += n;
	}
	Ok(())
}

/// The numeric identifier embedded in a run file's name. Discovery finds
/// the largest such id under a partition and adds one for the next file.
pub type RunId = u64;

pub fn data_file_name(id: RunId) -> String {
	format!("{:020}.run", id)
}

pub fn index_file_name(id: RunId) -> String {
	format!("{:020}.index", id)
}

/// Parses a run id back out of a run file's name, skipping anything that
/// isn't one (e.g. `manifest`, directory lock files) — part of `Partition`'s
/// discovery scan.
pub fn parse_run_id(file_name: &str) -> Option<RunId> {
	file_name.strip_suffix(".run")?.parse().ok()
}

/// Non-numeric staging name for a merge's output, written before the merge's
/// input run files are unlinked. `parse_run_id` rejects this name, so a crash
/// mid-merge leaves it invisible to `Partition::discover` rather than
/// double-counted alongside the untouched inputs.
pub fn transient_data_name() -> &'static str {
	"merge_tmp.run"
}

pub fn transient_index_name() -> &'static str {
	"merge_tmp.index"
}

/// A sorted, immutable, fixed-entry-size file on disk. Built all
/// at once (there is no in-place append once closed); opened read-only and
/// mapped for scanning.
pub struct RunFile<E: Entry> {
	id: RunId,
	data_path: PathBuf,
	file: File,
	map: Mmap,
	entry_count: u64,
	_marker: PhantomData<E>,
}

impl<E: Entry> RunFile<E> {
	fn header_bytes(entry_count: u64) -> [u8; HEADER_SIZE as usize] {
		let mut buf = [0u8; HEADER_SIZE as usize];
		buf[0..8].copy_from_slice(&MAGIC.to_le_bytes());
		buf[8..16].copy_from_slice(&entry_count.to_le_bytes());
		buf
	}

	fn write_to_path(path: &Path, entries: &[E]) -> Result<()> {
		let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("run");
		let tmp_path = path.with_file_name(format!("{}.tmp", file_name));
		{
			let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
			file.write_all(&Self::header_bytes(entries.len() as u64))?;
			let mut buf = vec![0u8; E::SIZE];
			for entry in entries {
				entry.to_bytes(&mut buf);
				file.write_all(&buf)?;
			}
			file.sync_all()?;
		}
		std::fs::rename(&tmp_path, path)?;
		log::trace!(target: "chesspos_db", "wrote run file {}", path.display());
		Ok(())
	}

	/// Writes a brand new run file containing exactly `entries`, already
	/// sorted by [`crate::entry::Key::full_key`].
	pub fn create(dir: &Path, id: RunId, entries: &[E]) -> Result<RunFile<E>> {
		Self::write_to_path(&dir.join(data_file_name(id)), entries)?;
		Self::open(dir, id)
	}

	/// Writes a run file at an arbitrary path rather than under a numbered
	/// id, used by [`crate::merge`] to stage a merge's output under a
	/// transient name before it is known to be safe to rename into place.
	pub fn create_at(path: &Path, entries: &[E]) -> Result<RunFile<E>> {
		Self::write_to_path(path, entries)?;
		Self::open_at(path, 0)
	}

	/// Opens an existing run file read-only and maps it.
	pub fn open(dir: &Path, id: RunId) -> Result<RunFile<E>> {
		Self::open_at(&dir.join(data_file_name(id)), id)
	}

	/// Opens a run file at an arbitrary path, stamping `id` for bookkeeping
	/// rather than parsing it out of the path.
	pub fn open_at(data_path: &Path, id: RunId) -> Result<RunFile<E>> {
		let file = OpenOptions::new().read(true).open(data_path)?;
		disable_read_ahead(&file)?;
		let mut header = [0u8; HEADER_SIZE as usize];
		read_at(&file, &mut header, 0)?;
		let magic = u64::from_le_bytes(header[0..8].try_into().unwrap());
		if magic != MAGIC {
			return Err(Error::Corruption(format!("bad run file header magic in {}", data_path.display())));
		}
		let entry_count = u64::from_le_bytes(header[8..16].try_into().unwrap());
		let map = unsafe { MmapOptions::new().map(&file)? };
		log::debug!(target: "chesspos_db", "opened run file {} with {} entries", data_path.display(), entry_count);
		Ok(RunFile { id, data_path: data_path.to_path_buf(), file, map, entry_count, _marker: PhantomData })
	}

	pub fn id(&self) -> RunId {
		self.id
	}

	pub fn path(&self) -> &Path {
		&self.data_path
	}

	pub fn len(&self) -> u64 {
		self.entry_count
	}

	pub fn is_empty(&self) -> bool {
		self.entry_count == 0
	}

	fn entry_offset(&self, index: u64) -> usize {
		(HEADER_SIZE + index * E::SIZE as u64) as usize
	}

	/// Random single-entry read, used by the sparse index's linear-scan
	/// refinement.
	pub fn read(&self, index: u64) -> E {
		let offset = self.entry_offset(index);
		E::from_bytes(&self.map[offset..offset + E::SIZE])
	}

	/// A contiguous run of entries, used by the query engine once
	/// [`crate::index::RangeIndex::equal_range`] has bounded a hash's
	/// occurrences.
	pub fn read_range(&self, start: u64, count: u64) -> Vec<E> {
		let mut out = Vec::with_capacity(count as usize);
		for i in start..start + count {
			out.push(self.read(i));
		}
		out
	}

	/// Streams every entry in order, used by [`crate::merge`]'s first-pass
	/// copy and by a from-scratch reindex.
	pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
		(0..self.entry_count).map(move |i| self.read(i))
	}

	pub fn sync_check(&self) -> Result<()> {
		self.file.sync_data().map_err(Error::Io)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::entry::{GameResult, Key, Level};
	use crate::format::epsilon::EpsilonEntry;

	struct TempDir(PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("run_file");
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
	fn writes_then_reads_entries_back_in_order() {
		let dir = TempDir::new("writes_then_reads_entries_back_in_order");
		let entries: Vec<EpsilonEntry> = (0..10u64)
			.map(|i| EpsilonEntry::new_single(Key::simple(i, None, Level::Human, GameResult::Draw), None, None))
			.collect();
		let run = RunFile::create(&dir.0, 1, &entries).unwrap();
		assert_eq!(run.len(), 10);
		let back = run.read_range(0, 10);
		for (a, b) in entries.iter().zip(back.iter()) {
			assert_eq!(a.key(), b.key());
		}
	}

	#[test]
	fn parses_run_id_from_file_name() {
		assert_eq!(parse_run_id(&data_file_name(42)), Some(42));
		assert_eq!(parse_run_id("manifest"), None);
	}
}

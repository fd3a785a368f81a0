// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sparse in-memory range index over a run file.
//!
//! A run file's entries are sorted by [`crate::entry::Key::full_key`], whose
//! leading component is the hash; every `granularity`-th entry's hash is
//! sampled into memory, bracketing any hash's true position to a window of
//! at most `granularity` entries, which `equal_range` then narrows with a
//! direct binary search against the mapped run file.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::Entry;
use crate::run_file::{index_file_name, RunFile};

#[derive(Clone, Debug)]
pub struct RangeIndex {
	granularity: u64,
	/// `samples[i] = (hash of entry at position i * granularity, i * granularity)`.
	samples: Vec<(u64, u64)>,
	entry_count: u64,
}

impl RangeIndex {
	/// Builds an index over an already-written run file by sampling its
	/// entries at `granularity` intervals.
	pub fn build<E: Entry>(run: &RunFile<E>, granularity: u64) -> RangeIndex {
		let granularity = granularity.max(1);
		let entry_count = run.len();
		let mut samples = Vec::with_capacity((entry_count / granularity + 1) as usize);
		let mut i = 0;
		while i < entry_count {
			samples.push((run.read(i).key().without_reverse_move_key(), i));
			i += granularity;
		}
		RangeIndex { granularity, samples, entry_count }
	}

	pub fn write(&self, dir: &Path, id: u64) -> Result<()> {
		self.write_to_path(&dir.join(index_file_name(id)))
	}

	pub fn write_to_path(&self, path: &Path) -> Result<()> {
		let mut file = std::fs::File::create(path)?;
		file.write_all(&self.granularity.to_le_bytes())?;
		file.write_all(&self.entry_count.to_le_bytes())?;
		file.write_all(&(self.samples.len() as u64).to_le_bytes())?;
		for (hash, position) in &self.samples {
			file.write_all(&hash.to_le_bytes())?;
			file.write_all(&position.to_le_bytes())?;
		}
		Ok(())
	}

	pub fn read(dir: &Path, id: u64) -> Result<RangeIndex> {
		Self::read_from_path(&dir.join(index_file_name(id)))
	}

	pub fn read_from_path(path: &Path) -> Result<RangeIndex> {
		let mut file = std::fs::File::open(path)?;
		let mut header = [0u8; 24];
		file.read_exact(&mut header)?;
		let granularity = u64::from_le_bytes(header[0..8].try_into().unwrap());
		let entry_count = u64::from_le_bytes(header[8..16].try_into().unwrap());
		let sample_count = u64::from_le_bytes(header[16..24].try_into().unwrap());
		let mut samples = Vec::with_capacity(sample_count as usize);
		let mut pair = [0u8; 16];
		for _ in 0..sample_count {
			file.read_exact(&mut pair).map_err(Error::Io)?;
			samples.push((u64::from_le_bytes(pair[0..8].try_into().unwrap()), u64::from_le_bytes(pair[8..16].try_into().unwrap())));
		}
		Ok(RangeIndex { granularity, samples, entry_count })
	}

	/// Brackets `hash`'s possible positions to `[lo, hi)` using the sparse
	/// samples only (no file access).
	fn sample_bracket(&self, hash: u64) -> (u64, u64) {
		match self.samples.binary_search_by_key(&hash, |&(h, _)| h) {
			Ok(i) => {
				let lo = self.samples[i].1;
				let hi = self.samples.get(i + 1).map_or(self.entry_count, |&(_, p)| p + self.granularity);
				(lo, hi.min(self.entry_count))
			}
			Err(i) => {
				let lo = if i == 0 { 0 } else { self.samples[i - 1].1 };
				let hi = self.samples.get(i).map_or(self.entry_count, |&(_, p)| p + self.granularity);
				(lo, hi.min(self.entry_count))
			}
		}
	}

	/// Every entry whose hash equals `hash`, as a `[start, start + count)`
	/// range into the run file — the without-reverse-move equivalence class
	/// a transposition or retraction query scans in full.
	pub fn equal_range<E: Entry>(&self, run: &RunFile<E>, hash: u64) -> (u64, u64) {
		let (mut lo, mut hi) = self.sample_bracket(hash);
		// lower_bound
		let mut start = hi;
		{
			let (mut l, mut h) = (lo, hi);
			while l < h {
				let mid = l + (h - l) / 2;
				if run.read(mid).key().without_reverse_move_key() < hash {
					l = mid + 1;
				} else {
					h = mid;
				}
			}
			start = l;
		}
		// upper_bound
		lo = start;
		hi = self.sample_bracket(hash).1.max(start);
		let mut end = hi;
		{
			let (mut l, mut h) = (lo, hi);
			while l < h {
				let mid = l + (h - l) / 2;
				if run.read(mid).key().without_reverse_move_key() <= hash {
					l = mid + 1;
				} else {
					h = mid;
				}
			}
			end = l;
		}
		(start, end.saturating_sub(start))
	}
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
			path.push("index");
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

	fn build_run(dir: &Path, hashes: &[u64]) -> RunFile<EpsilonEntry> {
		let entries: Vec<EpsilonEntry> =
			hashes.iter().map(|&h| EpsilonEntry::new_single(Key::simple(h, None, Level::Human, GameResult::Draw), None, None)).collect();
		RunFile::create(dir, 1, &entries).unwrap()
	}

	#[test]
	fn equal_range_finds_every_duplicate_hash() {
		let dir = TempDir::new("equal_range_finds_every_duplicate_hash");
		let hashes: Vec<u64> = vec![1, 2, 2, 2, 3, 5, 5, 9, 100, 100];
		let run = build_run(&dir.0, &hashes);
		let index = RangeIndex::build(&run, 2);
		let (start, count) = index.equal_range(&run, 2);
		assert_eq!((start, count), (1, 3));
		let (start, count) = index.equal_range(&run, 100);
		assert_eq!((start, count), (8, 2));
		let (_, count) = index.equal_range(&run, 42);
		assert_eq!(count, 0);
	}

	#[test]
	fn persists_and_reloads() {
		let dir = TempDir::new("persists_and_reloads");
		let hashes: Vec<u64> = (0..50u64).collect();
		let run = build_run(&dir.0, &hashes);
		let index = RangeIndex::build(&run, 4);
		index.write(&dir.0, 1).unwrap();
		let reloaded = RangeIndex::read(&dir.0, 1).unwrap();
		let (start, count) = reloaded.equal_range(&run, 30);
		assert_eq!((start, count), (30, 1));
	}
}

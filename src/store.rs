// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk store layout: most formats keep a single partition
//! directory (`data/`); `db_alpha` instead keeps one partition per
//! `(level, result)` pair (`data/<level>/<result>/`), since its entries
//! don't carry `level`/`result` savings worth deduplicating once the
//! directory already pins them. Both shapes are driven through the same
//! [`Store`] so `importer::Importer`/`query::Engine` don't special-case
//! `db_alpha`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::entry::{GameResult, Level};
use crate::error::Result;
use crate::format::Entry;
use crate::manifest::Manifest;
use crate::options::MergeOptions;
use crate::partition::Partition;

pub enum Store<E: Entry> {
	Single(Arc<Partition<E>>),
	PerLevelResult(BTreeMap<(Level, GameResult), Arc<Partition<E>>>),
}

impl<E: Entry> Store<E> {
	/// Opens `root/data` as one shared partition (every format except
	/// `db_alpha`).
	pub fn open_single(root: &Path) -> Result<Store<E>> {
		Manifest::create_or_validate(root, E::FORMAT_KEY, E::CURRENT_VERSION, E::MINIMUM_SUPPORTED_VERSION, E::REQUIRES_MATCHING_ENDIANNESS)?;
		Ok(Store::Single(Arc::new(Partition::open(&root.join("data"))?)))
	}

	/// Opens `root/data/<level>/<result>` for every `(level, result)` pair
	/// eagerly.
	pub fn open_per_level_result(root: &Path) -> Result<Store<E>> {
		Manifest::create_or_validate(root, E::FORMAT_KEY, E::CURRENT_VERSION, E::MINIMUM_SUPPORTED_VERSION, E::REQUIRES_MATCHING_ENDIANNESS)?;
		let mut map = BTreeMap::new();
		for level in Level::ALL {
			for result in GameResult::ALL {
				let dir = root.join("data").join(level.wire_word()).join(result.wire_word());
				map.insert((level, result), Arc::new(Partition::open(&dir)?));
			}
		}
		Ok(Store::PerLevelResult(map))
	}

	/// Every partition whose entries could satisfy a query restricted to
	/// `levels`/`results`. The single-partition layouts always
	/// return their one partition (the key itself still carries
	/// level/result, filtered after the scan); the per-(level,result)
	/// layout narrows up front to just the matching directories.
	pub fn partitions_for(&self, levels: &[Level], results: &[GameResult]) -> Vec<Arc<Partition<E>>> {
		match self {
			Store::Single(p) => vec![p.clone()],
			Store::PerLevelResult(map) => map
				.iter()
				.filter(|((level, result), _)| levels.contains(level) && results.contains(result))
				.map(|(_, p)| p.clone())
				.collect(),
		}
	}

	/// The partition a freshly imported batch for `(level, result)` belongs
	/// in.
	pub fn partition_for_write(&self, level: Level, result: GameResult) -> Arc<Partition<E>> {
		match self {
			Store::Single(p) => p.clone(),
			Store::PerLevelResult(map) => map.get(&(level, result)).expect("every (level, result) pair is opened eagerly").clone(),
		}
	}

	pub fn all_partitions(&self) -> Vec<Arc<Partition<E>>> {
		match self {
			Store::Single(p) => vec![p.clone()],
			Store::PerLevelResult(map) => map.values().cloned().collect(),
		}
	}

	/// Runs `merge::merge_all` over every partition in the store.
	pub fn merge_all(&self, options: &MergeOptions) -> Result<()> {
		self.merge_all_with_progress(options, |_| {})
	}

	/// Like [`Store::merge_all`], reporting progress as each partition's
	/// merge groups complete.
	pub fn merge_all_with_progress(&self, options: &MergeOptions, mut progress: impl FnMut(crate::merge::MergeProgress)) -> Result<()> {
		for partition in self.all_partitions() {
			crate::merge::merge_all_with_progress(&partition, options, &mut progress)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::format::epsilon::EpsilonEntry;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("store");
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
	fn single_store_serves_every_level_result_pair_from_one_partition() {
		let dir = TempDir::new("single_store_serves_every_level_result_pair_from_one_partition");
		let store: Store<EpsilonEntry> = Store::open_single(&dir.0).unwrap();
		assert_eq!(store.partitions_for(&Level::ALL, &GameResult::ALL).len(), 1);
		assert_eq!(store.all_partitions().len(), 1);
	}
}

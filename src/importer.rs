// SPDX-License-Identifier: MIT OR Apache-2.0

//! Importer: walks already-parsed games into per-position
//! entries and hands them to the store pipeline. Turning PGN/BCGN bytes into
//! [`GameRecord`]s is an external collaborator's job;
//! this module starts from the parsed move list.
//!
//! Grounded on `original_source/src/persistence/pos_db/GameHeader.h`'s id/
//! offset bookkeeping and on [`crate::pipeline::Pipeline`] for how entries
//! reach disk. The sequential and parallel strategies share one
//! `import_one`: the chess-heavy part (SAN parsing, move application,
//! hashing) never touches the header store, so it runs freely across
//! threads; only the header commit - predicting the next id/offset and
//! appending the record - is serialized, and it happens as a single
//! uninterrupted critical section rather than bracketing the heavy part, so
//! a concurrent commit from another thread can never land between the
//! prediction and the assertion that checks it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shakmaty::{Chess, Position};

use crate::entry::{GameRef, GameResult, Key, Level};
use crate::error::{Error, Result};
use crate::format::{Capabilities, Entry, GameRefKind};
use crate::header::{GameHeaderStore, NewGame};
use crate::options::{ImportOptions, PipelineOptions};
use crate::pipeline::Pipeline;
use crate::position::{self, ZobristHasher};
use crate::reverse_move::{self, PriorState, ReverseMove};
use crate::store::Store;

/// One game handed to the importer, already parsed. `result ==
/// None` models a game whose result could not be determined upstream; such
/// games are counted in [`ImportStats::games_skipped`] and never reach the
/// pipeline.
#[derive(Clone, Debug)]
pub struct GameRecord {
	pub level: Level,
	pub result: Option<GameResult>,
	pub date: Option<String>,
	pub eco: Option<String>,
	pub ply_count: Option<u16>,
	pub event: String,
	pub white: String,
	pub black: String,
	pub elo_diff: Option<i64>,
	pub starting_fen: Option<String>,
	pub sans: Vec<String>,
	/// Byte offset of this game in its source, for offset-referencing
	/// formats; ignored otherwise.
	pub source_offset: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ImportStats {
	pub games_imported: u64,
	pub games_skipped: u64,
	pub positions_imported: u64,
}

impl ImportStats {
	fn merge(&mut self, other: ImportStats) {
		self.games_imported += other.games_imported;
		self.games_skipped += other.games_skipped;
		self.positions_imported += other.positions_imported;
	}
}

/// One pipeline per partition a store actually has: a
/// single-partition format gets one pipeline; `db_alpha` gets one per
/// `(level, result)` pair so its nine directories fill concurrently instead
/// of serializing through one writer thread.
enum Pipelines<E: Entry> {
	Single(Pipeline<E>),
	PerLevelResult(HashMap<(Level, GameResult), Pipeline<E>>),
}

impl<E: Entry> Pipelines<E> {
	fn start(store: &Store<E>, options: &PipelineOptions) -> Pipelines<E> {
		match store {
			Store::Single(partition) => Pipelines::Single(Pipeline::start(partition.clone(), options)),
			Store::PerLevelResult(map) => {
				let mut pipelines = HashMap::with_capacity(map.len());
				for (&key, partition) in map {
					pipelines.insert(key, Pipeline::start(partition.clone(), options));
				}
				Pipelines::PerLevelResult(pipelines)
			}
		}
	}

	fn get_empty_buffer(&self, level: Level, result: GameResult) -> Vec<E> {
		match self {
			Pipelines::Single(p) => p.get_empty_buffer(),
			Pipelines::PerLevelResult(map) => map.get(&(level, result)).expect("every (level, result) pair has a pipeline").get_empty_buffer(),
		}
	}

	fn schedule_unordered(&self, level: Level, result: GameResult, buffer: Vec<E>) {
		match self {
			Pipelines::Single(p) => p.schedule_unordered(buffer),
			Pipelines::PerLevelResult(map) => map.get(&(level, result)).expect("every (level, result) pair has a pipeline").schedule_unordered(buffer),
		}
	}

	fn wait_for_completion(self) -> Result<()> {
		match self {
			Pipelines::Single(p) => p.wait_for_completion(),
			Pipelines::PerLevelResult(map) => {
				for (_, p) in map {
					p.wait_for_completion()?;
				}
				Ok(())
			}
		}
	}
}

/// Per-thread buffers, one per `(level, result)` pair touched so far, filled
/// across many games before being handed to the pipeline.
struct BufferCache<E: Entry> {
	buffers: HashMap<(Level, GameResult), Vec<E>>,
}

impl<E: Entry> BufferCache<E> {
	fn new() -> BufferCache<E> {
		BufferCache { buffers: HashMap::new() }
	}

	fn push(&mut self, pipelines: &Pipelines<E>, level: Level, result: GameResult, entry: E) {
		let buffer = self.buffers.entry((level, result)).or_insert_with(|| pipelines.get_empty_buffer(level, result));
		buffer.push(entry);
		if buffer.len() == buffer.capacity() {
			let full = std::mem::replace(buffer, pipelines.get_empty_buffer(level, result));
			pipelines.schedule_unordered(level, result, full);
		}
	}

	fn flush(self, pipelines: &Pipelines<E>) {
		for ((level, result), buffer) in self.buffers {
			if !buffer.is_empty() {
				pipelines.schedule_unordered(level, result, buffer);
			}
		}
	}
}

fn build_game_ref(capabilities: &Capabilities, index: u64, offset: Option<u64>) -> Option<GameRef> {
	match capabilities.game_ref_kind {
		GameRefKind::None => None,
		GameRefKind::Index => Some(GameRef::Index(index as u32)),
		GameRefKind::Offset => offset.map(GameRef::Offset),
	}
}

/// Drives games into a [`Store`]. Owns one pipeline per
/// partition and a shared handle to the game header store.
pub struct Importer<E: Entry> {
	pipelines: Pipelines<E>,
	hasher: Arc<dyn ZobristHasher>,
	header: Arc<Mutex<dyn GameHeaderStore>>,
	options: ImportOptions,
}

impl<E: Entry> Importer<E> {
	pub fn new(store: &Store<E>, hasher: Arc<dyn ZobristHasher>, header: Arc<Mutex<dyn GameHeaderStore>>, pipeline_options: &PipelineOptions, options: ImportOptions) -> Importer<E> {
		Importer { pipelines: Pipelines::start(store, pipeline_options), hasher, header, options }
	}

	/// Imports every game in `games`, choosing the sequential or parallel
	/// strategy from [`ImportOptions::num_threads`], then flushes the pipelines and the header store.
	pub fn import(self, games: Vec<GameRecord>) -> Result<ImportStats> {
		log::info!(target: "chesspos_db", "importing {} game(s) with {} thread(s)", games.len(), self.options.num_threads);
		let stats = if self.options.num_threads <= 1 { self.import_sequential(&games)? } else { self.import_parallel(&games)? };
		self.pipelines.wait_for_completion()?;
		self.header.lock().unwrap().flush();
		log::info!(target: "chesspos_db", "import complete: {} imported, {} skipped, {} positions", stats.games_imported, stats.games_skipped, stats.positions_imported);
		Ok(stats)
	}

	fn import_sequential(&self, games: &[GameRecord]) -> Result<ImportStats> {
		let mut stats = ImportStats::default();
		let mut cache = BufferCache::new();
		for game in games {
			self.import_one(&mut cache, &mut stats, game)?;
		}
		cache.flush(&self.pipelines);
		Ok(stats)
	}

	fn import_parallel(&self, games: &[GameRecord]) -> Result<ImportStats> {
		let num_threads = self.options.num_threads.max(1);
		let chunk_size = ((games.len() + num_threads - 1) / num_threads).max(1);
		let total = Mutex::new(ImportStats::default());
		std::thread::scope(|scope| -> Result<()> {
			let mut handles = Vec::new();
			for chunk in games.chunks(chunk_size) {
				let total = &total;
				handles.push(scope.spawn(move || -> Result<()> {
					let mut local_stats = ImportStats::default();
					let mut cache = BufferCache::new();
					for game in chunk {
						self.import_one(&mut cache, &mut local_stats, game)?;
					}
					cache.flush(&self.pipelines);
					total.lock().unwrap().merge(local_stats);
					Ok(())
				}));
			}
			for handle in handles {
				handle.join().expect("importer worker thread panicked")?;
			}
			Ok(())
		})?;
		Ok(*total.lock().unwrap())
	}

	/// Imports one game: walks its move list computing every position's key
	/// (the CPU-heavy, header-store-independent part), then commits the
	/// header record and stamps the computed keys with the id/offset it was
	/// actually assigned.
	fn import_one(&self, cache: &mut BufferCache<E>, stats: &mut ImportStats, game: &GameRecord) -> Result<()> {
		let result = match game.result {
			Some(result) => result,
			None => {
				stats.games_skipped += 1;
				return Ok(());
			}
		};

		let capabilities = E::capabilities();
		let elo_diff = if capabilities.has_elo_diff { game.elo_diff } else { None };

		let mut position = match &game.starting_fen {
			Some(fen) => position::parse_fen(fen)?,
			None => Chess::default(),
		};

		let mut keys = Vec::with_capacity(game.sans.len() + 1);
		keys.push(Key::simple(
			self.hasher.hash(&position),
			reverse_move_code(&capabilities, ReverseMove::Null, PriorState::default()),
			game.level,
			result,
		));
		for san in &game.sans {
			let mv = position::parse_san(&position, san)?;
			let (reverse, prior) = reverse_move::reverse_of(&position, &mv);
			position.play_unchecked(&mv);
			keys.push(Key::simple(self.hasher.hash(&position), reverse_move_code(&capabilities, reverse, prior), game.level, result));
		}

		let game_ref = {
			let mut header = self.header.lock().unwrap();
			let predicted_index = header.next_game_id();
			let predicted_offset = header.next_game_offset();
			let location = header.add_game(NewGame {
				result,
				date: game.date.clone(),
				eco: game.eco.clone(),
				ply_count: game.ply_count,
				event: game.event.clone(),
				white: game.white.clone(),
				black: game.black.clone(),
			});
			if location.index != predicted_index || (game.source_offset.is_none() && location.offset != predicted_offset) {
				log::error!(target: "chesspos_db", "header commit mismatch: predicted ({}, {}), assigned ({}, {})", predicted_index, predicted_offset, location.index, location.offset);
				return Err(Error::Corruption(format!(
					"header store assigned ({}, {}) but importer predicted ({}, {})",
					location.index, location.offset, predicted_index, predicted_offset
				)));
			}
			build_game_ref(&capabilities, location.index, game.source_offset.or(Some(location.offset)))
		};

		stats.games_imported += 1;
		stats.positions_imported += keys.len() as u64;
		for key in keys {
			for entry in E::new_single_group(key, game_ref, elo_diff) {
				cache.push(&self.pipelines, game.level, result, entry);
			}
		}
		Ok(())
	}
}

fn reverse_move_code(capabilities: &Capabilities, mv: ReverseMove, prior: PriorState) -> Option<u32> {
	if capabilities.has_reverse_move {
		Some(reverse_move::pack(mv, prior))
	} else {
		None
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::format::epsilon::EpsilonEntry;
	use crate::header::InMemoryGameHeaderStore;
	use crate::position::ReferenceZobristHasher;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("importer");
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

	fn sample_game(white: &str, sans: &[&str]) -> GameRecord {
		GameRecord {
			level: Level::Human,
			result: Some(GameResult::WhiteWin),
			date: None,
			eco: None,
			ply_count: None,
			event: "test event".into(),
			white: white.into(),
			black: "black".into(),
			elo_diff: Some(20),
			starting_fen: None,
			sans: sans.iter().map(|s| s.to_string()).collect(),
			source_offset: None,
		}
	}

	#[test]
	fn sequential_import_writes_one_entry_per_position_including_the_start() {
		let dir = TempDir::new("sequential_import_writes_one_entry_per_position_including_the_start");
		let store: Store<EpsilonEntry> = Store::open_single(&dir.0).unwrap();
		let header = Arc::new(Mutex::new(InMemoryGameHeaderStore::new()));
		let importer = Importer::new(
			&store,
			Arc::new(ReferenceZobristHasher),
			header.clone(),
			&PipelineOptions { num_buffers: 2, buffer_capacity: 64, num_sort_threads: 1 },
			ImportOptions { memory_budget_bytes: 1 << 20, num_threads: 1 },
		);
		let games = vec![sample_game("alice", &["e4", "e5", "Nf3"])];
		let stats = importer.import(games).unwrap();
		assert_eq!(stats.games_imported, 1);
		assert_eq!(stats.positions_imported, 4);
		assert_eq!(header.lock().unwrap().num_games(), 1);
	}

	#[test]
	fn games_with_unknown_result_are_skipped() {
		let dir = TempDir::new("games_with_unknown_result_are_skipped");
		let store: Store<EpsilonEntry> = Store::open_single(&dir.0).unwrap();
		let header = Arc::new(Mutex::new(InMemoryGameHeaderStore::new()));
		let importer = Importer::new(
			&store,
			Arc::new(ReferenceZobristHasher),
			header.clone(),
			&PipelineOptions::default(),
			ImportOptions::default(),
		);
		let mut game = sample_game("bob", &["d4"]);
		game.result = None;
		let stats = importer.import(vec![game]).unwrap();
		assert_eq!(stats.games_skipped, 1);
		assert_eq!(stats.games_imported, 0);
		assert_eq!(header.lock().unwrap().num_games(), 0);
	}

	#[test]
	fn parallel_import_across_many_games_preserves_total_position_count() {
		let dir = TempDir::new("parallel_import_across_many_games_preserves_total_position_count");
		let store: Store<EpsilonEntry> = Store::open_single(&dir.0).unwrap();
		let header = Arc::new(Mutex::new(InMemoryGameHeaderStore::new()));
		let games: Vec<GameRecord> = (0..20).map(|i| sample_game(&format!("player{}", i), &["e4", "e5"])).collect();
		let importer = Importer::new(
			&store,
			Arc::new(ReferenceZobristHasher),
			header.clone(),
			&PipelineOptions { num_buffers: 4, buffer_capacity: 8, num_sort_threads: 2 },
			ImportOptions { memory_budget_bytes: 1 << 20, num_threads: 4 },
		);
		let stats = importer.import(games).unwrap();
		assert_eq!(stats.games_imported, 20);
		assert_eq!(stats.positions_imported, 60);
		assert_eq!(header.lock().unwrap().num_games(), 20);
	}
}

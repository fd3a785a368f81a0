// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query engine and its wire format, grounded on
//! `original_source/src/persistence/pos_db/Query.h`'s `Request`/`Response`/
//! `SegregatedEntries`/`Select` shapes.
//!
//! `Query.h`'s `Select` (`Continuations`/`Transpositions`/`All`) turns out to
//! be exactly [`crate::entry::Key`]'s two reverse-move equivalences applied
//! to one incoming move: `Continuations` keeps entries whose reverse move
//! equals the move that was actually played to reach the position being
//! reported on, `Transpositions` keeps the rest, and `All` keeps everything
//! at that hash. A root
//! position given without an incoming move uses
//! [`crate::reverse_move::ReverseMove::Null`] as that move, so
//! `Continuations` there means "games that started in exactly this
//! position".
//!
//! `db_delta_smeared`'s logical entries are smeared across several physical
//! records sharing a key except for `Key::smear_slot`
//! (`format::delta_smeared`). This engine scans and combines at `Entry`
//! granularity like every other format, bucketing by `(level, result,
//! smear_slot)` so same-slot records combine correctly, then folds the
//! per-slot results back into one logical entry with `fold_slots` - the
//! engine never needs to know smearing exists.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Move, Position};

use crate::entry::{GameRef, GameResult, Level};
use crate::error::{Error, Result};
use crate::format::{Capabilities, Entry, Select};
use crate::header::{GameHeader, GameHeaderStore};
use crate::partition::Partition;
use crate::position::{self, ZobristHasher};
use crate::reverse_move::{self, PriorState, ReverseMove};
use crate::store::Store;

/// A position to query, as FEN plus an optional move to apply to it. The move, when present, both moves the query to the child
/// position and becomes the "incoming move" [`Select`] is evaluated against.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootPosition {
	pub fen: String,
	#[serde(rename = "move")]
	pub mv: Option<String>,
}

/// Per-select fetch flags.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalFetchingOptions {
	pub fetch_children: bool,
	pub fetch_first_game: bool,
	pub fetch_last_game: bool,
	pub fetch_elo_diff: bool,
}

/// Fetch flags for the retractions pass, which has no `fetchChildren`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRetractionsFetchingOptions {
	pub fetch_first_game: bool,
	pub fetch_last_game: bool,
	pub fetch_elo_diff: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	pub token: Option<String>,
	pub positions: Vec<RootPosition>,
	#[serde(default)]
	pub levels: Vec<Level>,
	#[serde(default)]
	pub results: Vec<GameResult>,
	pub fetching_options: BTreeMap<Select, AdditionalFetchingOptions>,
	#[serde(default)]
	pub retractions_fetching_options: Option<AdditionalRetractionsFetchingOptions>,
}

impl Request {
	/// Request-shape rules not already enforced by the type (FEN/move
	/// legality is checked while building the query, since that needs
	/// [`crate::position`]): no fetching option, more than two, `All`
	/// combined with another, or an empty level/result set are all rejected
	/// here rather than silently defaulted.
	pub fn validate(&self) -> Result<()> {
		if self.positions.is_empty() {
			return Err(Error::InvalidInput("request must include at least one position".into()));
		}
		if self.fetching_options.is_empty() {
			return Err(Error::InvalidInput("request must specify at least one select".into()));
		}
		if self.fetching_options.len() > 2 {
			return Err(Error::InvalidInput("request must specify at most two selects".into()));
		}
		if self.fetching_options.len() > 1 && self.fetching_options.contains_key(&Select::All) {
			return Err(Error::InvalidInput("select All cannot be combined with another select".into()));
		}
		if self.levels.is_empty() {
			return Err(Error::InvalidInput("request must specify at least one level".into()));
		}
		if self.results.is_empty() {
			return Err(Error::InvalidInput("request must specify at least one result".into()));
		}
		Ok(())
	}
}

/// Resolved statistics for one `(level, result)` bucket. Fields
/// are `None` both when the underlying format lacks the capability
/// ([`Capabilities`]) and when the request didn't ask for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
	pub count: u64,
	pub first_game: Option<GameHeader>,
	pub last_game: Option<GameHeader>,
	pub elo_diff: Option<i64>,
}

/// `(level, result)` -> [`Entry`], nested so the wire form is
/// `{"human": {"win": {...}}}` rather than a flat tuple-keyed map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SegregatedEntries(pub BTreeMap<Level, BTreeMap<GameResult, Entry>>);

impl SegregatedEntries {
	fn emplace(&mut self, level: Level, result: GameResult, entry: Entry) {
		self.0.entry(level).or_insert_with(BTreeMap::new).insert(result, entry);
	}

	pub fn get(&self, level: Level, result: GameResult) -> Option<&Entry> {
		self.0.get(&level)?.get(&result)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectResult {
	pub root: SegregatedEntries,
	pub children: BTreeMap<String, SegregatedEntries>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultForRoot {
	pub position: RootPosition,
	pub results_by_select: BTreeMap<Select, SelectResult>,
	/// One bucket per distinct move that could have led to this position,
	/// keyed by a short move descriptor.
	pub retractions: Option<BTreeMap<String, SegregatedEntries>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	pub results: Vec<ResultForRoot>,
}

fn resolve_game_ref(header: &Mutex<dyn GameHeaderStore>, game_ref: GameRef) -> Option<GameHeader> {
	let header = header.lock().unwrap();
	match game_ref {
		GameRef::Index(i) => header.query_by_indices(&[i as u64]).into_iter().next(),
		GameRef::Offset(o) => header.query_by_offsets(&[o]).into_iter().next(),
	}
}

/// Folds one logical position's physical records back into one statistics
/// tuple. Every format except `db_delta_smeared` stores one physical record
/// per logical entry, so `slots` has exactly one element and this is just
/// that record's own accessors; `db_delta_smeared` splits `count`/
/// `first_game_ref`/`last_game_ref`/`elo_diff` across up to
/// [`crate::format::delta_smeared::SMEAR_SLOTS`] records, each of which reports only its own slice and `None`/`0`
/// elsewhere, so summing `count` and taking the first `Some` of the rest
/// reconstructs the logical view without this engine needing to know
/// smearing exists.
fn fold_slots<E: Entry>(slots: &[E]) -> (u64, Option<GameRef>, Option<GameRef>, Option<i64>) {
	let mut count = 0u64;
	let mut first_game = None;
	let mut last_game = None;
	let mut elo_diff = None;
	for entry in slots {
		count += entry.count();
		first_game = first_game.or_else(|| entry.first_game_ref());
		last_game = last_game.or_else(|| entry.last_game_ref());
		elo_diff = elo_diff.or_else(|| entry.elo_diff());
	}
	(count, first_game, last_game, elo_diff)
}

fn to_wire_entry<E: Entry>(slots: &[E], capabilities: &Capabilities, header: &Mutex<dyn GameHeaderStore>, fetch_first: bool, fetch_last: bool, fetch_elo: bool) -> Entry {
	let (count, first, last, elo) = fold_slots(slots);
	let first_game = if fetch_first && capabilities.has_first_game { first.and_then(|r| resolve_game_ref(header, r)) } else { None };
	let last_game = if fetch_last && capabilities.has_last_game { last.and_then(|r| resolve_game_ref(header, r)) } else { None };
	let elo_diff = if fetch_elo && capabilities.has_elo_diff { elo } else { None };
	Entry { count, first_game, last_game, elo_diff }
}

/// A position plus the reverse-move it was reached by, ready for scanning.
struct PositionQuery {
	hash: u64,
	/// `None` when the format has no reverse move at all; `Some(None)` is
	/// not representable, so a root with no incoming move uses the packed
	/// [`ReverseMove::Null`] instead.
	incoming_reverse_move: Option<u32>,
}

/// Drives queries against a [`Store`]. Borrows the store, the
/// zobrist hasher, and the header store for the duration of the query.
pub struct Engine<'a, E: Entry> {
	store: &'a Store<E>,
	hasher: &'a dyn ZobristHasher,
	header: &'a Mutex<dyn GameHeaderStore>,
}

impl<'a, E: Entry> Engine<'a, E> {
	pub fn new(store: &'a Store<E>, hasher: &'a dyn ZobristHasher, header: &'a Mutex<dyn GameHeaderStore>) -> Engine<'a, E> {
		Engine { store, hasher, header }
	}

	pub fn execute(&self, request: &Request) -> Result<Response> {
		request.validate()?;
		let levels = &request.levels;
		let results = &request.results;
		let partitions = self.store.partitions_for(levels, results);
		let capabilities = E::capabilities();
		log::debug!(target: "chesspos_db", "query: {} position(s), {} level(s), {} result(s), {} partition(s)", request.positions.len(), levels.len(), results.len(), partitions.len());

		let mut results_out = Vec::with_capacity(request.positions.len());
		for root_position in &request.positions {
			results_out.push(self.execute_one(root_position, levels, results, &partitions, &capabilities, request)?);
		}
		Ok(Response { results: results_out })
	}

	fn execute_one(
		&self,
		root_position: &RootPosition,
		levels: &[Level],
		results: &[GameResult],
		partitions: &[Arc<Partition<E>>],
		capabilities: &Capabilities,
		request: &Request,
	) -> Result<ResultForRoot> {
		let base = position::parse_fen(&root_position.fen)?;
		let (actual_root, incoming_reverse_move) = match &root_position.mv {
			Some(san) => {
				let mv = position::parse_san(&base, san)?;
				let (reverse, prior) = reverse_move::reverse_of(&base, &mv);
				let mut after = base.clone();
				after.play_unchecked(&mv);
				(after, reverse_move_code(capabilities, reverse, prior))
			}
			None => (base, reverse_move_code(capabilities, ReverseMove::Null, PriorState::default())),
		};

		let root_query = PositionQuery { hash: self.hasher.hash(&actual_root), incoming_reverse_move };
		let need_children = request.fetching_options.values().any(|o| o.fetch_children);
		let children: Vec<(String, Move, PositionQuery)> = if need_children {
			position::legal_moves(&actual_root)
				.into_iter()
				.map(|mv| {
					let san = position::move_to_san(&actual_root, &mv);
					let (reverse, prior) = reverse_move::reverse_of(&actual_root, &mv);
					let mut child = actual_root.clone();
					child.play_unchecked(&mv);
					let query = PositionQuery { hash: self.hasher.hash(&child), incoming_reverse_move: reverse_move_code(capabilities, reverse, prior) };
					(san, mv, query)
				})
				.collect()
		} else {
			Vec::new()
		};

		let mut results_by_select = BTreeMap::new();
		for (&select, fetch) in &request.fetching_options {
			let root = self.segregate(partitions, levels, results, capabilities, &root_query, select, fetch.fetch_first_game, fetch.fetch_last_game, fetch.fetch_elo_diff);
			let mut children_out = BTreeMap::new();
			if fetch.fetch_children {
				for (san, _, query) in &children {
					let bucket = self.segregate(partitions, levels, results, capabilities, query, select, fetch.fetch_first_game, fetch.fetch_last_game, fetch.fetch_elo_diff);
					children_out.insert(san.clone(), bucket);
				}
			}
			results_by_select.insert(select, SelectResult { root, children: children_out });
		}

		let retractions = match &request.retractions_fetching_options {
			Some(fetch) => Some(self.gather_retractions(partitions, levels, results, capabilities, &actual_root, root_query.hash, fetch)),
			None => None,
		};

		Ok(ResultForRoot { position: root_position.clone(), results_by_select, retractions })
	}

	fn scan_hash(&self, partitions: &[Arc<Partition<E>>], hash: u64, levels: &[Level], results: &[GameResult]) -> Vec<E> {
		let mut out = Vec::new();
		for partition in partitions {
			for opened in partition.snapshot() {
				let (start, count) = opened.index().equal_range(opened.run(), hash);
				for entry in opened.run().read_range(start, count) {
					let key = entry.key();
					if key.hash == hash && levels.contains(&key.level) && results.contains(&key.result) {
						out.push(entry);
					}
				}
			}
		}
		log::trace!(target: "chesspos_db", "scan_hash({}): {} matching entries across {} partition(s)", crate::display::hex(&hash.to_le_bytes()), out.len(), partitions.len());
		out
	}

	#[allow(clippy::too_many_arguments)]
	fn segregate(
		&self,
		partitions: &[Arc<Partition<E>>],
		levels: &[Level],
		results: &[GameResult],
		capabilities: &Capabilities,
		query: &PositionQuery,
		select: Select,
		fetch_first: bool,
		fetch_last: bool,
		fetch_elo: bool,
	) -> SegregatedEntries {
		let entries = self.scan_hash(partitions, query.hash, levels, results);
		// Bucketed by (level, result, smear_slot): a logical db_delta_smeared
		// entry is several physical records sharing a key except for
		// `smear_slot`, so combining without the
		// slot would merge unrelated payloads under `DeltaSmearedEntry::combine`.
		let mut buckets: BTreeMap<(Level, GameResult, u8), E> = BTreeMap::new();
		for entry in entries {
			let key = entry.key();
			let include = match select {
				Select::All => true,
				Select::Continuations => capabilities.allows_filtering_transpositions && key.reverse_move == query.incoming_reverse_move,
				Select::Transpositions => capabilities.allows_filtering_transpositions && key.reverse_move != query.incoming_reverse_move,
			};
			if !include {
				continue;
			}
			buckets.entry((key.level, key.result, key.smear_slot)).and_modify(|acc| acc.combine(&entry)).or_insert(entry);
		}

		let mut by_level_result: BTreeMap<(Level, GameResult), Vec<E>> = BTreeMap::new();
		for ((level, result, _slot), entry) in buckets {
			by_level_result.entry((level, result)).or_insert_with(Vec::new).push(entry);
		}

		let mut out = SegregatedEntries::default();
		for ((level, result), slots) in by_level_result {
			out.emplace(level, result, to_wire_entry(&slots, capabilities, self.header, fetch_first, fetch_last, fetch_elo));
		}
		out
	}

	/// Groups every entry at `hash` by its own reverse move, labelling each
	/// group with a short move descriptor.
	fn gather_retractions(
		&self,
		partitions: &[Arc<Partition<E>>],
		levels: &[Level],
		results: &[GameResult],
		capabilities: &Capabilities,
		root: &Chess,
		hash: u64,
		fetch: &AdditionalRetractionsFetchingOptions,
	) -> BTreeMap<String, SegregatedEntries> {
		if !capabilities.has_reverse_move {
			return BTreeMap::new();
		}
		let entries = self.scan_hash(partitions, hash, levels, results);
		let mut by_move: BTreeMap<u32, BTreeMap<(Level, GameResult, u8), E>> = BTreeMap::new();
		for entry in entries {
			let key = entry.key();
			let code = match key.reverse_move {
				Some(code) => code,
				None => continue,
			};
			by_move.entry(code).or_insert_with(BTreeMap::new).entry((key.level, key.result, key.smear_slot)).and_modify(|acc| acc.combine(&entry)).or_insert(entry);
		}

		let mut out = BTreeMap::new();
		for (code, buckets) in by_move {
			let (reverse, _prior) = reverse_move::unpack(code, root);
			let mut by_level_result: BTreeMap<(Level, GameResult), Vec<E>> = BTreeMap::new();
			for ((level, result, _slot), entry) in buckets {
				by_level_result.entry((level, result)).or_insert_with(Vec::new).push(entry);
			}
			let mut segregated = SegregatedEntries::default();
			for ((level, result), slots) in by_level_result {
				segregated.emplace(level, result, to_wire_entry(&slots, capabilities, self.header, fetch.fetch_first_game, fetch.fetch_last_game, fetch.fetch_elo_diff));
			}
			out.insert(describe_reverse_move(reverse), segregated);
		}
		out
	}
}

fn reverse_move_code(capabilities: &Capabilities, mv: ReverseMove, prior: PriorState) -> Option<u32> {
	if capabilities.has_reverse_move {
		Some(reverse_move::pack(mv, prior))
	} else {
		None
	}
}

/// A short, human-readable label for a decoded [`ReverseMove`]. Not a SAN renderer: a reverse move's "from"
/// square is the position-before-undo's source square, which [`position`]'s
/// SAN helpers have no use for.
fn describe_reverse_move(mv: ReverseMove) -> String {
	match mv {
		ReverseMove::Null => "start".to_string(),
		ReverseMove::Normal { from, to, .. } => format!("{}{}", from, to),
		ReverseMove::Castle { king_from, king_to } => format!("{}{}", king_from, king_to),
		ReverseMove::Promotion { from, to, role, .. } => format!("{}{}={:?}", from, to, role),
		ReverseMove::EnPassant { from, to } => format!("{}{} e.p.", from, to),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::entry::Key;
	use crate::format::delta::DeltaEntry;
	use crate::format::delta_smeared::{pack_group, DeltaSmearedEntry, Logical};
	use crate::header::InMemoryGameHeaderStore;
	use crate::position::ReferenceZobristHasher;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("query");
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

	fn fetch_all() -> AdditionalFetchingOptions {
		AdditionalFetchingOptions { fetch_children: true, fetch_first_game: true, fetch_last_game: true, fetch_elo_diff: true }
	}

	#[test]
	fn continuations_and_transpositions_partition_all() {
		let dir = TempDir::new("continuations_and_transpositions_partition_all");
		let store: Store<DeltaEntry> = Store::open_single(&dir.0).unwrap();
		let hasher = ReferenceZobristHasher;
		let header = Mutex::new(InMemoryGameHeaderStore::new());

		let start = Chess::default();
		let e4 = position::parse_san(&start, "e4").unwrap();
		let mut after_e4 = start.clone();
		after_e4.play_unchecked(&e4);
		let hash = hasher.hash(&after_e4);
		let (reverse, prior) = reverse_move::reverse_of(&start, &e4);
		let via_e4 = reverse_move::pack(reverse, prior);

		let other_code = reverse_move::pack(ReverseMove::Null, PriorState::default());

		if let Store::Single(partition) = &store {
			let via_e4_entry = DeltaEntry::new_single(Key::simple(hash, Some(via_e4), Level::Human, GameResult::WhiteWin), Some(GameRef::Index(1)), Some(10));
			let other_entry = DeltaEntry::new_single(Key::simple(hash, Some(other_code), Level::Human, GameResult::WhiteWin), Some(GameRef::Index(2)), Some(-5));
			partition.store_sorted(&{
				let mut v = vec![via_e4_entry, other_entry];
				v.sort_unstable_by_key(|e| e.key());
				v
			}).unwrap();
		}

		let engine = Engine::new(&store, &hasher, &header);
		let position = RootPosition { fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string(), mv: None };

		let continuations_and_transpositions = Request {
			token: None,
			positions: vec![position.clone()],
			levels: Level::ALL.to_vec(),
			results: GameResult::ALL.to_vec(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::Continuations, fetch_all());
				m.insert(Select::Transpositions, fetch_all());
				m
			},
			retractions_fetching_options: None,
		};
		let response = engine.execute(&continuations_and_transpositions).unwrap();
		let result = &response.results[0];
		let continuations = result.results_by_select.get(&Select::Continuations).unwrap();
		assert_eq!(continuations.root.get(Level::Human, GameResult::WhiteWin).unwrap().count, 1);
		let transpositions = result.results_by_select.get(&Select::Transpositions).unwrap();
		assert_eq!(transpositions.root.get(Level::Human, GameResult::WhiteWin).unwrap().count, 1);

		let all_only = Request {
			token: None,
			positions: vec![position],
			levels: Level::ALL.to_vec(),
			results: GameResult::ALL.to_vec(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::All, fetch_all());
				m
			},
			retractions_fetching_options: None,
		};
		let response = engine.execute(&all_only).unwrap();
		let all = response.results[0].results_by_select.get(&Select::All).unwrap();
		assert_eq!(all.root.get(Level::Human, GameResult::WhiteWin).unwrap().count, 2);
	}

	#[test]
	fn smeared_entries_combine_and_fold_into_one_logical_count() {
		let dir = TempDir::new("smeared_entries_combine_and_fold_into_one_logical_count");
		let store: Store<DeltaSmearedEntry> = Store::open_single(&dir.0).unwrap();
		let hasher = ReferenceZobristHasher;
		let header = Mutex::new(InMemoryGameHeaderStore::new());

		let start = Chess::default();
		let e4 = position::parse_san(&start, "e4").unwrap();
		let mut after_e4 = start.clone();
		after_e4.play_unchecked(&e4);
		let hash = hasher.hash(&after_e4);
		let (reverse, prior) = reverse_move::reverse_of(&start, &e4);
		let via_e4 = reverse_move::pack(reverse, prior);
		let key = Key::simple(hash, Some(via_e4), Level::Human, GameResult::WhiteWin);

		let first = Logical { key, count: 1, elo_diff: 50, total_elo: 50, first_game_index: 1, last_game_index: 1 };
		let second = Logical { key, count: 1, elo_diff: -20, total_elo: 20, first_game_index: 2, last_game_index: 2 };
		let mut records: Vec<DeltaSmearedEntry> = Vec::new();
		records.extend(pack_group(&first));
		records.extend(pack_group(&second));
		records.sort_unstable_by_key(|e| e.key());

		if let Store::Single(partition) = &store {
			partition.store_sorted(&records).unwrap();
		}

		let engine = Engine::new(&store, &hasher, &header);
		let position = RootPosition { fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string(), mv: None };
		let request = Request {
			token: None,
			positions: vec![position],
			levels: Level::ALL.to_vec(),
			results: GameResult::ALL.to_vec(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::Continuations, fetch_all());
				m
			},
			retractions_fetching_options: None,
		};
		let response = engine.execute(&request).unwrap();
		let continuations = response.results[0].results_by_select.get(&Select::Continuations).unwrap();
		let entry = continuations.root.get(Level::Human, GameResult::WhiteWin).unwrap();
		assert_eq!(entry.count, 2);
		assert_eq!(entry.elo_diff, Some(30));
	}

	#[test]
	fn request_combining_all_with_another_select_is_rejected() {
		let request = Request {
			token: None,
			positions: vec![RootPosition { fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(), mv: None }],
			levels: Level::ALL.to_vec(),
			results: GameResult::ALL.to_vec(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::All, AdditionalFetchingOptions::default());
				m.insert(Select::Continuations, AdditionalFetchingOptions::default());
				m
			},
			retractions_fetching_options: None,
		};
		assert!(request.validate().is_err());
	}

	#[test]
	fn request_with_empty_level_set_is_rejected() {
		let request = Request {
			token: None,
			positions: vec![RootPosition { fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(), mv: None }],
			levels: Vec::new(),
			results: GameResult::ALL.to_vec(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::All, AdditionalFetchingOptions::default());
				m
			},
			retractions_fetching_options: None,
		};
		assert!(request.validate().is_err());
	}

	#[test]
	fn request_without_positions_is_rejected() {
		let request = Request {
			token: None,
			positions: Vec::new(),
			levels: Vec::new(),
			results: Vec::new(),
			fetching_options: {
				let mut m = BTreeMap::new();
				m.insert(Select::All, AdditionalFetchingOptions::default());
				m
			},
			retractions_fetching_options: None,
		};
		assert!(request.validate().is_err());
	}
}

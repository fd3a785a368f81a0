// SPDX-License-Identifier: MIT OR Apache-2.0

//! Game header collaborator, grounded on
//! `original_source/src/persistence/pos_db/GameHeader.h`.
//!
//! The core never stores more than one of `{game-index, game-offset}` per
//! side of an entry; resolving that reference into a displayable
//! [`GameHeader`] is this external collaborator's job. [`GameHeaderStore`]
//! is the trait `importer::Importer`/`query::Engine` depend on;
//! `original_source`'s `IndexedGameHeaderStorage` is not reimplemented here -
//! that storage engine is out of scope for this crate.
//! [`InMemoryGameHeaderStore`] is a small reference implementation used by
//! this crate's own tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entry::GameResult;

/// Resolved, display-ready game metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameHeader {
	pub game_idx: u64,
	#[serde(serialize_with = "serialize_pgn_result", deserialize_with = "deserialize_pgn_result")]
	pub result: GameResult,
	pub date: Option<String>,
	pub eco: Option<String>,
	pub ply_count: Option<u16>,
	pub event: String,
	pub white: String,
	pub black: String,
}

fn serialize_pgn_result<S: serde::Serializer>(result: &GameResult, serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str(result.to_pgn_result())
}

fn deserialize_pgn_result<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<GameResult, D::Error> {
	let word = String::deserialize(deserializer)?;
	GameResult::from_pgn_result(&word).ok_or_else(|| serde::de::Error::custom(format!("unknown pgn result '{}'", word)))
}

/// The fields `importer::Importer` hands the header store once a game's
/// result is known.
#[derive(Clone, Debug)]
pub struct NewGame {
	pub result: GameResult,
	pub date: Option<String>,
	pub eco: Option<String>,
	pub ply_count: Option<u16>,
	pub event: String,
	pub white: String,
	pub black: String,
}

/// `{offset, index}` returned by `addGame` in
/// `original_source/.../GameHeader.h`'s `HeaderEntryLocation`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderEntryLocation {
	pub offset: u64,
	pub index: u64,
}

/// External collaborator: resolves `{game-index, game-offset}` references
/// into [`GameHeader`]s and hands out fresh ids/offsets as games are
/// ingested. Never implemented by this crate's core logic
/// beyond the in-memory reference below; a production embedder backs this
/// with `IndexedGameHeaderStorage`'s on-disk two-file layout.
pub trait GameHeaderStore: Send + Sync {
	/// The id the *next* `add_game` call will assign.
	fn next_game_id(&self) -> u64;

	/// The byte offset the *next* `add_game` call will assign, for formats
	/// that reference games by offset instead of index.
	fn next_game_offset(&self) -> u64;

	/// Appends one game's header, returning the location it was actually
	/// assigned. The importer asserts this matches the id/offset it
	/// pre-computed via [`GameHeaderStore::next_game_id`]/
	/// [`GameHeaderStore::next_game_offset`].
	fn add_game(&mut self, game: NewGame) -> HeaderEntryLocation;

	fn query_by_indices(&self, indices: &[u64]) -> Vec<GameHeader>;
	fn query_by_offsets(&self, offsets: &[u64]) -> Vec<GameHeader>;

	fn num_games(&self) -> u64;
	fn flush(&mut self);
	fn clear(&mut self);
}

/// Reference [`GameHeaderStore`] backing this crate's tests: every header
/// kept in memory, indexed by both its index and its offset (`offset` is
/// simply the index here, since there is no underlying PGN byte stream to
/// measure against).
#[derive(Default)]
pub struct InMemoryGameHeaderStore {
	games: Vec<GameHeader>,
	by_offset: HashMap<u64, usize>,
}

impl InMemoryGameHeaderStore {
	pub fn new() -> InMemoryGameHeaderStore {
		InMemoryGameHeaderStore::default()
	}
}

impl GameHeaderStore for InMemoryGameHeaderStore {
	fn next_game_id(&self) -> u64 {
		self.games.len() as u64
	}

	fn next_game_offset(&self) -> u64 {
		self.games.len() as u64
	}

	fn add_game(&mut self, game: NewGame) -> HeaderEntryLocation {
		let idx = self.games.len() as u64;
		self.by_offset.insert(idx, self.games.len());
		self.games.push(GameHeader {
			game_idx: idx,
			result: game.result,
			date: game.date,
			eco: game.eco,
			ply_count: game.ply_count,
			event: game.event,
			white: game.white,
			black: game.black,
		});
		HeaderEntryLocation { offset: idx, index: idx }
	}

	fn query_by_indices(&self, indices: &[u64]) -> Vec<GameHeader> {
		indices.iter().filter_map(|&i| self.games.get(i as usize).cloned()).collect()
	}

	fn query_by_offsets(&self, offsets: &[u64]) -> Vec<GameHeader> {
		offsets.iter().filter_map(|&o| self.by_offset.get(&o)).filter_map(|&i| self.games.get(i).cloned()).collect()
	}

	fn num_games(&self) -> u64 {
		self.games.len() as u64
	}

	fn flush(&mut self) {}

	fn clear(&mut self) {
		self.games.clear();
		self.by_offset.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn game(white: &str) -> NewGame {
		NewGame { result: GameResult::WhiteWin, date: None, eco: None, ply_count: None, event: "e".into(), white: white.into(), black: "b".into() }
	}

	#[test]
	fn assigns_monotone_ids_matching_precomputed_next_id() {
		let mut store = InMemoryGameHeaderStore::new();
		let predicted = store.next_game_id();
		let loc = store.add_game(game("alice"));
		assert_eq!(loc.index, predicted);
		assert_eq!(store.num_games(), 1);
	}

	#[test]
	fn resolves_by_index_and_offset() {
		let mut store = InMemoryGameHeaderStore::new();
		store.add_game(game("alice"));
		store.add_game(game("bob"));
		let by_index = store.query_by_indices(&[1]);
		assert_eq!(by_index[0].white, "bob");
		let by_offset = store.query_by_offsets(&[0]);
		assert_eq!(by_offset[0].white, "alice");
	}
}

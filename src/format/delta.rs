// SPDX-License-Identifier: MIT OR Apache-2.0

//! `db_delta`: count, first/last game index, and Elo difference, keyed by
//! reverse move, PGN only, 32-byte entries. Grounded on
//! `original_source/src/persistence/pos_db/delta/DatabaseFormatDelta.h`.

use crate::entry::{GameRef, GameResult, Key, Level};
use crate::format::{Bounds, Capabilities, Entry, GameRefKind};
use crate::manifest::SemanticVersion;
use crate::reverse_move::REVERSE_MOVE_BITS;

#[derive(Clone, Copy, Debug)]
pub struct DeltaEntry {
	hash: u64,
	reverse_move: Option<u32>,
	level: Level,
	result: GameResult,
	count: u32,
	first_game_index: u32,
	last_game_index: u32,
	elo_diff: i64,
}

fn pack_meta(reverse_move: Option<u32>, level: Level, result: GameResult) -> u32 {
	let rm = reverse_move.unwrap_or(0) & ((1 << REVERSE_MOVE_BITS) - 1);
	rm | ((level.bits() as u32) << REVERSE_MOVE_BITS) | ((result.bits() as u32) << (REVERSE_MOVE_BITS + 2))
}

fn unpack_meta(meta: u32) -> (u32, Level, GameResult) {
	let rm = meta & ((1 << REVERSE_MOVE_BITS) - 1);
	let level = Level::from_bits((meta >> REVERSE_MOVE_BITS) as u8);
	let result = GameResult::from_bits((meta >> (REVERSE_MOVE_BITS + 2)) as u8);
	(rm, level, result)
}

impl Entry for DeltaEntry {
	const SIZE: usize = 32;
	const FORMAT_KEY: &'static str = "db_delta";
	const CURRENT_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const MINIMUM_SUPPORTED_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const REQUIRES_MATCHING_ENDIANNESS: bool = true;

	fn capabilities() -> Capabilities {
		Capabilities {
			allows_filtering_transpositions: true,
			has_reverse_move: true,
			has_first_game: true,
			has_last_game: true,
			has_elo_diff: true,
			game_ref_kind: GameRefKind::Index,
		}
	}

	fn bounds() -> Bounds {
		Bounds {
			max_games: u32::MAX as u64,
			max_positions: 1 << 48,
			max_instances_of_single_position: u32::MAX as u64,
			max_abs_elo_diff: i32::MAX as i64,
			min_elo: 0,
			max_elo: 4000,
		}
	}

	fn key(&self) -> Key {
		Key::simple(self.hash, self.reverse_move, self.level, self.result)
	}

	fn count(&self) -> u64 {
		self.count as u64
	}

	fn elo_diff(&self) -> Option<i64> {
		Some(self.elo_diff)
	}

	fn first_game_ref(&self) -> Option<GameRef> {
		Some(GameRef::Index(self.first_game_index))
	}

	fn last_game_ref(&self) -> Option<GameRef> {
		Some(GameRef::Index(self.last_game_index))
	}

	fn combine(&mut self, other: &Self) {
		self.count = self.count.saturating_add(other.count);
		self.first_game_index = self.first_game_index.min(other.first_game_index);
		self.last_game_index = self.last_game_index.max(other.last_game_index);
		self.elo_diff = self.elo_diff.saturating_add(other.elo_diff);
	}

	fn to_bytes(&self, out: &mut [u8]) {
		debug_assert_eq!(out.len(), Self::SIZE);
		out[0..8].copy_from_slice(&self.hash.to_le_bytes());
		out[8..12].copy_from_slice(&pack_meta(self.reverse_move, self.level, self.result).to_le_bytes());
		out[12..16].copy_from_slice(&self.count.to_le_bytes());
		out[16..20].copy_from_slice(&self.first_game_index.to_le_bytes());
		out[20..24].copy_from_slice(&self.last_game_index.to_le_bytes());
		out[24..32].copy_from_slice(&self.elo_diff.to_le_bytes());
	}

	fn from_bytes(buf: &[u8]) -> Self {
		debug_assert_eq!(buf.len(), Self::SIZE);
		let meta = u32::from_le_bytes(buf[8..12].try_into().unwrap());
		let (rm, level, result) = unpack_meta(meta);
		DeltaEntry {
			hash: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
			reverse_move: Some(rm),
			level,
			result,
			count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
			first_game_index: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
			last_game_index: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
			elo_diff: i64::from_le_bytes(buf[24..32].try_into().unwrap()),
		}
	}

	fn new_single(key: Key, first_game: Option<GameRef>, elo_diff: Option<i64>) -> Self {
		let index = match first_game {
			Some(GameRef::Index(i)) => i,
			_ => 0,
		};
		DeltaEntry {
			hash: key.hash,
			reverse_move: key.reverse_move,
			level: key.level,
			result: key.result,
			count: 1,
			first_game_index: index,
			last_game_index: index,
			elo_diff: elo_diff.unwrap_or(0),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let e = DeltaEntry::new_single(
			Key::simple(11, Some(54321), Level::Server, GameResult::WhiteWin),
			Some(GameRef::Index(2)),
			Some(-150),
		);
		let mut bytes = [0u8; DeltaEntry::SIZE];
		e.to_bytes(&mut bytes);
		let back = DeltaEntry::from_bytes(&bytes);
		assert_eq!(back.key(), e.key());
		assert_eq!(back.elo_diff(), Some(-150));
	}

	#[test]
	fn combine_sums_elo_diff() {
		let mut a = DeltaEntry::new_single(Key::simple(1, Some(0), Level::Human, GameResult::Draw), Some(GameRef::Index(1)), Some(40));
		let b = DeltaEntry::new_single(Key::simple(1, Some(0), Level::Human, GameResult::Draw), Some(GameRef::Index(2)), Some(-10));
		a.combine(&b);
		assert_eq!(a.count(), 2);
		assert_eq!(a.elo_diff(), Some(30));
	}
}

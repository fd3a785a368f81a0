// SPDX-License-Identifier: MIT OR Apache-2.0

//! `db_alpha`: partitions the key space by `(level, result)` at the
//! directory level, so each
//! partition's entries share one level/result pair; count plus first/last
//! game index, PGN only, 24-byte entries. Grounded on
//! `original_source/src/persistence/pos_db/alpha/DatabaseFormatAlpha.h`.

use crate::entry::{GameRef, GameResult, Key, Level};
use crate::format::{pack_reverse_move_meta, unpack_reverse_move_meta, Bounds, Capabilities, Entry, GameRefKind};
use crate::manifest::SemanticVersion;

#[derive(Clone, Copy, Debug)]
pub struct AlphaEntry {
	hash: u64,
	reverse_move: Option<u32>,
	level: Level,
	result: GameResult,
	count: u32,
	first_game_index: u32,
	last_game_index: u32,
}

impl Entry for AlphaEntry {
	const SIZE: usize = 24;
	const FORMAT_KEY: &'static str = "db_alpha";
	const CURRENT_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const MINIMUM_SUPPORTED_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const REQUIRES_MATCHING_ENDIANNESS: bool = true;

	fn capabilities() -> Capabilities {
		Capabilities {
			allows_filtering_transpositions: true,
			has_reverse_move: true,
			has_first_game: true,
			has_last_game: true,
			has_elo_diff: false,
			game_ref_kind: GameRefKind::Index,
		}
	}

	fn bounds() -> Bounds {
		Bounds {
			max_games: u32::MAX as u64,
			max_positions: 1 << 48,
			max_instances_of_single_position: u32::MAX as u64,
			max_abs_elo_diff: 0,
			min_elo: 0,
			max_elo: 0,
		}
	}

	fn key(&self) -> Key {
		Key::simple(self.hash, self.reverse_move, self.level, self.result)
	}

	fn count(&self) -> u64 {
		self.count as u64
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
	}

	fn to_bytes(&self, out: &mut [u8]) {
		debug_assert_eq!(out.len(), Self::SIZE);
		out[0..8].copy_from_slice(&self.hash.to_le_bytes());
		out[8..12].copy_from_slice(&self.count.to_le_bytes());
		out[12..16].copy_from_slice(&self.first_game_index.to_le_bytes());
		out[16..20].copy_from_slice(&self.last_game_index.to_le_bytes());
		out[20..24].copy_from_slice(&pack_reverse_move_meta(self.reverse_move, self.level, self.result).to_le_bytes());
	}

	fn from_bytes(buf: &[u8]) -> Self {
		debug_assert_eq!(buf.len(), Self::SIZE);
		let meta = u32::from_le_bytes(buf[20..24].try_into().unwrap());
		let (rm, level, result) = unpack_reverse_move_meta(meta);
		AlphaEntry {
			hash: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
			reverse_move: Some(rm),
			count: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
			first_game_index: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
			last_game_index: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
			level,
			result,
		}
	}

	fn new_single(key: Key, first_game: Option<GameRef>, _elo_diff: Option<i64>) -> Self {
		let index = match first_game {
			Some(GameRef::Index(i)) => i,
			_ => 0,
		};
		AlphaEntry {
			hash: key.hash,
			reverse_move: key.reverse_move,
			level: key.level,
			result: key.result,
			count: 1,
			first_game_index: index,
			last_game_index: index,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let e = AlphaEntry::new_single(Key::simple(3, Some(54321), Level::Engine, GameResult::BlackWin), Some(GameRef::Index(5)), None);
		let mut bytes = [0u8; AlphaEntry::SIZE];
		e.to_bytes(&mut bytes);
		let back = AlphaEntry::from_bytes(&bytes);
		assert_eq!(back.key(), e.key());
		assert_eq!(back.first_game_ref(), Some(GameRef::Index(5)));
		assert_eq!(back.last_game_ref(), Some(GameRef::Index(5)));
	}

	#[test]
	fn combine_widens_first_last_range() {
		let mut a = AlphaEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), Some(GameRef::Index(10)), None);
		let b = AlphaEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), Some(GameRef::Index(2)), None);
		a.combine(&b);
		assert_eq!(a.count(), 2);
		assert_eq!(a.first_game_ref(), Some(GameRef::Index(2)));
		assert_eq!(a.last_game_ref(), Some(GameRef::Index(10)));
	}
}

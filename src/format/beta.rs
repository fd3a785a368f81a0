// SPDX-License-Identifier: MIT OR Apache-2.0

//! `db_beta`: one partition, count plus a packed first-game offset, PGN
//! only, 20-byte entries, grounded on
//! `original_source/src/persistence/pos_db/beta/DatabaseFormatBeta.h`.

use crate::entry::{GameRef, GameResult, Key, Level, PackedCountGameOffset};
use crate::format::{pack_reverse_move_meta, unpack_reverse_move_meta, Bounds, Capabilities, Entry, GameRefKind};
use crate::manifest::SemanticVersion;

#[derive(Clone, Copy, Debug)]
pub struct BetaEntry {
	hash: u64,
	reverse_move: Option<u32>,
	level: Level,
	result: GameResult,
	count_offset: PackedCountGameOffset,
}

impl Entry for BetaEntry {
	const SIZE: usize = 20;
	const FORMAT_KEY: &'static str = "db_beta";
	const CURRENT_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const MINIMUM_SUPPORTED_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const REQUIRES_MATCHING_ENDIANNESS: bool = true;

	fn capabilities() -> Capabilities {
		Capabilities {
			allows_filtering_transpositions: true,
			has_reverse_move: true,
			has_first_game: true,
			has_last_game: false,
			has_elo_diff: false,
			game_ref_kind: GameRefKind::Offset,
		}
	}

	fn bounds() -> Bounds {
		Bounds {
			max_games: 1 << 40,
			max_positions: 1 << 48,
			max_instances_of_single_position: (1u64 << 58) - 1,
			max_abs_elo_diff: 0,
			min_elo: 0,
			max_elo: 0,
		}
	}

	fn key(&self) -> Key {
		Key::simple(self.hash, self.reverse_move, self.level, self.result)
	}

	fn count(&self) -> u64 {
		self.count_offset.count()
	}

	fn first_game_ref(&self) -> Option<GameRef> {
		self.count_offset.offset().map(|o| GameRef::Offset(o))
	}

	fn combine(&mut self, other: &Self) {
		self.count_offset = self.count_offset.combine(other.count_offset);
	}

	fn to_bytes(&self, out: &mut [u8]) {
		debug_assert_eq!(out.len(), Self::SIZE);
		out[0..8].copy_from_slice(&self.hash.to_le_bytes());
		out[8..12].copy_from_slice(&pack_reverse_move_meta(self.reverse_move, self.level, self.result).to_le_bytes());
		out[12..20].copy_from_slice(&self.count_offset.to_bits().to_le_bytes());
	}

	fn from_bytes(buf: &[u8]) -> Self {
		debug_assert_eq!(buf.len(), Self::SIZE);
		let hash = u64::from_le_bytes(buf[0..8].try_into().unwrap());
		let meta = u32::from_le_bytes(buf[8..12].try_into().unwrap());
		let (rm, level, result) = unpack_reverse_move_meta(meta);
		let count_offset = PackedCountGameOffset::from_bits(u64::from_le_bytes(buf[12..20].try_into().unwrap()));
		BetaEntry { hash, reverse_move: Some(rm), level, result, count_offset }
	}

	fn new_single(key: Key, first_game: Option<GameRef>, _elo_diff: Option<i64>) -> Self {
		let offset = match first_game {
			Some(GameRef::Offset(o)) => Some(o),
			_ => None,
		};
		BetaEntry {
			hash: key.hash,
			reverse_move: key.reverse_move,
			level: key.level,
			result: key.result,
			count_offset: PackedCountGameOffset::new(1, offset),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let e = BetaEntry::new_single(Key::simple(7, Some(321), Level::Server, GameResult::WhiteWin), Some(GameRef::Offset(99)), None);
		let mut bytes = [0u8; BetaEntry::SIZE];
		e.to_bytes(&mut bytes);
		let back = BetaEntry::from_bytes(&bytes);
		assert_eq!(back.key(), e.key());
		assert_eq!(back.first_game_ref(), Some(GameRef::Offset(99)));
	}

	#[test]
	fn combine_sums_count_keeps_smaller_offset() {
		let mut a = BetaEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), Some(GameRef::Offset(10)), None);
		let b = BetaEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), Some(GameRef::Offset(30)), None);
		a.combine(&b);
		assert_eq!(a.count(), 2);
		assert_eq!(a.first_game_ref(), Some(GameRef::Offset(10)));
	}
}

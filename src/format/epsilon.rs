// SPDX-License-Identifier: MIT OR Apache-2.0

//! `db_epsilon`: count only, PGN+BCGN, 16-byte entries, grounded
//! on `original_source/src/persistence/pos_db/epsilon/DatabaseFormatEpsilon.h`.
//! The smallest format: no game references, no Elo — just a reverse-move-
//! keyed count.

use crate::entry::{GameResult, Key, Level};
use crate::format::{Bounds, Capabilities, Entry, GameRefKind};
use crate::manifest::SemanticVersion;
use crate::reverse_move::REVERSE_MOVE_BITS;

#[derive(Clone, Copy, Debug)]
pub struct EpsilonEntry {
	hash: u64,
	reverse_move: Option<u32>,
	level: Level,
	result: GameResult,
	count: u64,
}

/// Remaining bits after `level`(2) + `result`(2) + the reverse move
/// (`REVERSE_MOVE_BITS`) share this format's 64-bit meta word with `count`.
/// `original_source`'s `epsilon/DatabaseFormatEpsilon.h` instead gives the
/// reverse move its own smaller 20-bit "perfect hash" and a plain 32-bit
/// count; this crate keeps the uniform `REVERSE_MOVE_BITS` encoding all
/// formats share, trading count headroom for that consistency.
const COUNT_BITS: u32 = 64 - 2 - 2 - REVERSE_MOVE_BITS;
const COUNT_MASK: u64 = (1u64 << COUNT_BITS) - 1;
const REVERSE_MOVE_MASK: u64 = (1u64 << REVERSE_MOVE_BITS) - 1;

impl Entry for EpsilonEntry {
	const SIZE: usize = 16;
	const FORMAT_KEY: &'static str = "db_epsilon";
	const CURRENT_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const MINIMUM_SUPPORTED_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
	const REQUIRES_MATCHING_ENDIANNESS: bool = true;

	fn capabilities() -> Capabilities {
		Capabilities {
			allows_filtering_transpositions: true,
			has_reverse_move: true,
			has_first_game: false,
			has_last_game: false,
			has_elo_diff: false,
			game_ref_kind: GameRefKind::None,
		}
	}

	fn bounds() -> Bounds {
		Bounds {
			max_games: 1 << 40,
			max_positions: 1 << 48,
			max_instances_of_single_position: COUNT_MASK,
			max_abs_elo_diff: 0,
			min_elo: 0,
			max_elo: 0,
		}
	}

	fn key(&self) -> Key {
		Key::simple(self.hash, self.reverse_move, self.level, self.result)
	}

	fn count(&self) -> u64 {
		self.count
	}

	fn combine(&mut self, other: &Self) {
		self.count = (self.count + other.count).min(COUNT_MASK);
	}

	fn to_bytes(&self, out: &mut [u8]) {
		debug_assert_eq!(out.len(), Self::SIZE);
		out[0..8].copy_from_slice(&self.hash.to_le_bytes());
		let rm = (self.reverse_move.unwrap_or(0) as u64) & REVERSE_MOVE_MASK;
		let meta = ((self.level.bits() as u64) << 62)
			| ((self.result.bits() as u64) << 60)
			| (rm << COUNT_BITS)
			| (self.count & COUNT_MASK);
		out[8..16].copy_from_slice(&meta.to_le_bytes());
	}

	fn from_bytes(buf: &[u8]) -> Self {
		debug_assert_eq!(buf.len(), Self::SIZE);
		let hash = u64::from_le_bytes(buf[0..8].try_into().unwrap());
		let meta = u64::from_le_bytes(buf[8..16].try_into().unwrap());
		EpsilonEntry {
			hash,
			reverse_move: Some(((meta >> COUNT_BITS) & REVERSE_MOVE_MASK) as u32),
			level: Level::from_bits((meta >> 62) as u8),
			result: GameResult::from_bits((meta >> 60) as u8),
			count: meta & COUNT_MASK,
		}
	}

	fn new_single(key: Key, _first_game: Option<crate::entry::GameRef>, _elo_diff: Option<i64>) -> Self {
		EpsilonEntry { hash: key.hash, reverse_move: key.reverse_move, level: key.level, result: key.result, count: 1 }
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let e = EpsilonEntry {
			hash: 0xdead_beef_cafe_1234,
			reverse_move: Some(98765),
			level: Level::Engine,
			result: GameResult::BlackWin,
			count: 42,
		};
		let mut bytes = [0u8; EpsilonEntry::SIZE];
		e.to_bytes(&mut bytes);
		let back = EpsilonEntry::from_bytes(&bytes);
		assert_eq!(back.hash, e.hash);
		assert_eq!(back.reverse_move, e.reverse_move);
		assert_eq!(back.level, e.level);
		assert_eq!(back.result, e.result);
		assert_eq!(back.count, e.count);
	}

	#[test]
	fn combine_sums_counts() {
		let mut a = EpsilonEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), None, None);
		let b = EpsilonEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), None, None);
		a.combine(&b);
		assert_eq!(a.count(), 2);
	}
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! `db_delta_smeared`: `db_delta`'s statistics widened to a 64-bit count and
//! a 64-bit total-Elo accumulator, PGN+BCGN. The widened fields no longer fit in one 20-byte record, so a
//! logical entry is *smeared* across four physical records sharing one
//! [`Key`] — each carrying a fixed-position slice of the statistics and
//! discriminated by [`Key::smear_slot`]. Grounded on
//! `original_source/src/persistence/pos_db/delta/DatabaseFormatDeltaSmeared.h`.
//!
//! [`Entry::combine`] operates per physical slot (two records combine only
//! if `full_equal`, which requires a matching `smear_slot`), so the generic
//! pipeline/run_file/merge machinery is unaware that smearing exists at all.
//! Only [`pack_group`]/[`unsmear`], used by the importer and query engine
//! respectively, know that four consecutive records make up one logical
//! entry.

use crate::entry::{GameRef, GameResult, Key, Level};
use crate::format::{Bounds, Capabilities, Entry, GameRefKind};
use crate::manifest::SemanticVersion;
use crate::reverse_move::REVERSE_MOVE_BITS;

/// Number of physical records one logical `db_delta_smeared` entry expands
/// into. Fixed, not stored on disk: the query engine's unsmear scan always
/// reads a run of this many consecutive same-key records.
pub const SMEAR_SLOTS: u8 = 4;

#[derive(Clone, Copy, Debug)]
pub struct DeltaSmearedEntry {
	hash: u64,
	reverse_move: Option<u32>,
	level: Level,
	result: GameResult,
	slot: u8,
	payload: u64,
}

/// Packs the reverse move plus `level`/`result`/`slot` into one `u32`: the
/// slot index is stored directly (2 bits, `REVERSE_MOVE_BITS + 4..+6`) rather
/// than a single is-first flag, since a flag can only distinguish slot 0 from
/// "not slot 0" and this format has four slots to tell apart on read-back.
fn pack_meta(reverse_move: Option<u32>, level: Level, result: GameResult, slot: u8) -> u32 {
	let rm = reverse_move.unwrap_or(0) & ((1 << REVERSE_MOVE_BITS) - 1);
	rm | ((level.bits() as u32) << REVERSE_MOVE_BITS)
		| ((result.bits() as u32) << (REVERSE_MOVE_BITS + 2))
		| ((slot as u32 & 0b11) << (REVERSE_MOVE_BITS + 4))
}

fn unpack_meta(meta: u32) -> (u32, Level, GameResult, u8) {
	let rm = meta & ((1 << REVERSE_MOVE_BITS) - 1);
	let level = Level::from_bits((meta >> REVERSE_MOVE_BITS) as u8);
	let result = GameResult::from_bits((meta >> (REVERSE_MOVE_BITS + 2)) as u8);
	let slot = ((meta >> (REVERSE_MOVE_BITS + 4)) & 0b11) as u8;
	(rm, level, result, slot)
}

impl Entry for DeltaSmearedEntry {
	const SIZE: usize = 20;
	const FORMAT_KEY: &'static str = "db_delta_smeared";
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
			max_games: u64::MAX,
			max_positions: 1 << 48,
			max_instances_of_single_position: u64::MAX,
			max_abs_elo_diff: i64::MAX,
			min_elo: 0,
			max_elo: 4000,
		}
	}

	fn key(&self) -> Key {
		let mut key = Key::simple(self.hash, self.reverse_move, self.level, self.result);
		key.smear_slot = self.slot;
		key
	}

	fn count(&self) -> u64 {
		if self.slot == 1 {
			self.payload
		} else {
			0
		}
	}

	fn elo_diff(&self) -> Option<i64> {
		if self.slot == 2 {
			Some(self.payload as i64)
		} else {
			None
		}
	}

	fn first_game_ref(&self) -> Option<GameRef> {
		if self.slot == 0 {
			Some(GameRef::Index((self.payload & 0xffff_ffff) as u32))
		} else {
			None
		}
	}

	fn last_game_ref(&self) -> Option<GameRef> {
		if self.slot == 0 {
			Some(GameRef::Index((self.payload >> 32) as u32))
		} else {
			None
		}
	}

	/// Combines two physical records holding the same slot of the same
	/// logical entry: `full_equal` (same hash/reverse_move/level/result
	/// *and* same `smear_slot`) guarantees they carry the same kind of
	/// payload.
	fn combine(&mut self, other: &Self) {
		debug_assert_eq!(self.slot, other.slot);
		self.payload = match self.slot {
			0 => {
				let first = (self.payload & 0xffff_ffff).min(other.payload & 0xffff_ffff);
				let last = (self.payload >> 32).max(other.payload >> 32);
				first | (last << 32)
			}
			1 => self.payload.saturating_add(other.payload),
			2 => ((self.payload as i64).saturating_add(other.payload as i64)) as u64,
			_ => self.payload.saturating_add(other.payload),
		};
	}

	fn to_bytes(&self, out: &mut [u8]) {
		debug_assert_eq!(out.len(), Self::SIZE);
		out[0..8].copy_from_slice(&self.hash.to_le_bytes());
		out[8..12].copy_from_slice(&pack_meta(self.reverse_move, self.level, self.result, self.slot).to_le_bytes());
		out[12..20].copy_from_slice(&self.payload.to_le_bytes());
	}

	fn from_bytes(buf: &[u8]) -> Self {
		debug_assert_eq!(buf.len(), Self::SIZE);
		let meta = u32::from_le_bytes(buf[8..12].try_into().unwrap());
		let (rm, level, result, slot) = unpack_meta(meta);
		DeltaSmearedEntry {
			hash: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
			reverse_move: Some(rm),
			level,
			result,
			slot,
			payload: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
		}
	}

	/// Falls back to a single-slot (`first_game`/`last_game` only) record.
	/// The importer builds a full four-record group with [`pack_group`]
	/// instead; this exists only so the format still satisfies [`Entry`].
	fn new_single(key: Key, first_game: Option<GameRef>, _elo_diff: Option<i64>) -> Self {
		let index = match first_game {
			Some(GameRef::Index(i)) => i as u64,
			_ => 0,
		};
		DeltaSmearedEntry {
			hash: key.hash,
			reverse_move: key.reverse_move,
			level: key.level,
			result: key.result,
			slot: 0,
			payload: index | (index << 32),
		}
	}

	/// Builds the full four-record smear group for one traversed position:
	/// `count` starts at one occurrence, and `total_elo` tracks the magnitude
	/// of this game's Elo difference as a second, always-positive accumulator
	/// alongside the signed `elo_diff` sum `db_delta` also keeps.
	fn new_single_group(key: Key, first_game: Option<GameRef>, elo_diff: Option<i64>) -> Vec<Self> {
		let index = match first_game {
			Some(GameRef::Index(i)) => i,
			_ => 0,
		};
		let elo = elo_diff.unwrap_or(0);
		let logical = Logical { key, count: 1, elo_diff: elo, total_elo: elo.unsigned_abs(), first_game_index: index, last_game_index: index };
		pack_group(&logical).to_vec()
	}
}

/// The logical, unsmeared view of one position's statistics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Logical {
	pub key: Key,
	pub count: u64,
	pub elo_diff: i64,
	pub total_elo: u64,
	pub first_game_index: u32,
	pub last_game_index: u32,
}

/// Expands one logical entry into the fixed-length run of physical records
/// the importer writes.
pub fn pack_group(logical: &Logical) -> [DeltaSmearedEntry; SMEAR_SLOTS as usize] {
	let base = |slot: u8| DeltaSmearedEntry {
		hash: logical.key.hash,
		reverse_move: logical.key.reverse_move,
		level: logical.key.level,
		result: logical.key.result,
		slot,
		payload: 0,
	};
	[
		DeltaSmearedEntry { payload: (logical.first_game_index as u64) | ((logical.last_game_index as u64) << 32), ..base(0) },
		DeltaSmearedEntry { payload: logical.count, ..base(1) },
		DeltaSmearedEntry { payload: logical.elo_diff as u64, ..base(2) },
		DeltaSmearedEntry { payload: logical.total_elo, ..base(3) },
	]
}

/// Folds a run of physical records sharing one key back into a [`Logical`]
/// view. `run` must be exactly [`SMEAR_SLOTS`] records,
/// slot 0 first, as produced by [`pack_group`].
pub fn unsmear(run: &[DeltaSmearedEntry]) -> Logical {
	debug_assert_eq!(run.len(), SMEAR_SLOTS as usize);
	let head = run[0];
	Logical {
		key: {
			let mut k = Key::simple(head.hash, head.reverse_move, head.level, head.result);
			k.smear_slot = 0;
			k
		},
		first_game_index: (run[0].payload & 0xffff_ffff) as u32,
		last_game_index: (run[0].payload >> 32) as u32,
		count: run[1].payload,
		elo_diff: run[2].payload as i64,
		total_elo: run[3].payload,
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn group_round_trips_through_bytes() {
		let logical = Logical {
			key: Key::simple(99, Some(777), Level::Engine, GameResult::Draw),
			count: 1 << 40,
			elo_diff: -12_345,
			total_elo: 1 << 50,
			first_game_index: 3,
			last_game_index: 300,
		};
		let group = pack_group(&logical);
		let mut round_tripped = Vec::new();
		for entry in &group {
			let mut bytes = [0u8; DeltaSmearedEntry::SIZE];
			entry.to_bytes(&mut bytes);
			round_tripped.push(DeltaSmearedEntry::from_bytes(&bytes));
		}
		for (original, decoded) in group.iter().zip(round_tripped.iter()) {
			assert_eq!(decoded.slot, original.slot, "slot must survive a byte round-trip on its own");
		}
		let back = unsmear(&round_tripped);
		assert_eq!(back, logical);
	}

	#[test]
	fn combine_widens_count_and_elo_independently() {
		let a = Logical {
			key: Key::simple(1, Some(0), Level::Human, GameResult::WhiteWin),
			count: 10,
			elo_diff: 50,
			total_elo: 200,
			first_game_index: 0,
			last_game_index: 5,
		};
		let b = Logical { first_game_index: 1, last_game_index: 9, count: 20, elo_diff: -5, total_elo: 400, ..a };
		let mut group_a = pack_group(&a);
		let group_b = pack_group(&b);
		for (slot, other) in group_a.iter_mut().zip(group_b.iter()) {
			slot.combine(other);
		}
		let combined = unsmear(&group_a);
		assert_eq!(combined.count, 30);
		assert_eq!(combined.elo_diff, 45);
		assert_eq!(combined.total_elo, 600);
		assert_eq!(combined.first_game_index, 0);
		assert_eq!(combined.last_game_index, 9);
	}
}

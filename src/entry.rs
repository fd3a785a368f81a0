// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/Entry schema shared by every format.
//!
//! `table.rs`'s `Entry<B: AsRef<[u8]> + AsMut<[u8]>>` byte-cursor is the
//! direct model for how each format's concrete entry packs/unpacks its
//! bytes; this module holds the parts that are common to all five formats
//! (the two small enumerations, the sortable `Key`, and the packed
//! count/game-reference slot), while `crate::format` holds the per-format
//! byte layouts.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Who produced the game: folded into the key so sort order groups by it.
/// Serializes as its wire word (`"human"`/`"engine"`/`"server"`) rather than
/// the derive-macro default, since `Level` is used both as an ordinary field
/// and as a `SegregatedEntries` map key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Level {
	Human = 0,
	Engine = 1,
	Server = 2,
}

impl Level {
	pub const ALL: [Level; 3] = [Level::Human, Level::Engine, Level::Server];

	pub fn from_bits(bits: u8) -> Level {
		match bits & 0b11 {
			0 => Level::Human,
			1 => Level::Engine,
			_ => Level::Server,
		}
	}
	pub fn bits(self) -> u8 {
		self as u8
	}

	pub fn wire_word(self) -> &'static str {
		match self {
			Level::Human => "human",
			Level::Engine => "engine",
			Level::Server => "server",
		}
	}

	pub fn from_wire_word(word: &str) -> Option<Level> {
		match word {
			"human" => Some(Level::Human),
			"engine" => Some(Level::Engine),
			"server" => Some(Level::Server),
			_ => None,
		}
	}
}

impl Serialize for Level {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.wire_word())
	}
}

impl<'de> Deserialize<'de> for Level {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let word = String::deserialize(deserializer)?;
		Level::from_wire_word(&word).ok_or_else(|| D::Error::custom(format!("unknown level '{}'", word)))
	}
}

/// The game's outcome, from White's perspective. Serializes as its own
/// `Result (word)` wire form (`"win"`/`"loss"`/`"draw"`); the distinct
/// `Result (pgn)` form (`"1-0"`/`"0-1"`/`"1/2-1/2"`) used inside headers is
/// handled separately by [`crate::header::GameHeader`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum GameResult {
	WhiteWin = 0,
	BlackWin = 1,
	Draw = 2,
}

impl GameResult {
	pub const ALL: [GameResult; 3] = [GameResult::WhiteWin, GameResult::BlackWin, GameResult::Draw];

	pub fn from_bits(bits: u8) -> GameResult {
		match bits & 0b11 {
			0 => GameResult::WhiteWin,
			1 => GameResult::BlackWin,
			_ => GameResult::Draw,
		}
	}
	pub fn bits(self) -> u8 {
		self as u8
	}

	/// `original_source/src/persistence/pos_db/GameHeader.h`'s PGN result
	/// string mapping, i.e. the `Result (pgn)` wire words.
	pub fn from_pgn_result(result: &str) -> Option<GameResult> {
		match result {
			"1-0" => Some(GameResult::WhiteWin),
			"0-1" => Some(GameResult::BlackWin),
			"1/2-1/2" => Some(GameResult::Draw),
			_ => None,
		}
	}

	pub fn to_pgn_result(self) -> &'static str {
		match self {
			GameResult::WhiteWin => "1-0",
			GameResult::BlackWin => "0-1",
			GameResult::Draw => "1/2-1/2",
		}
	}

	pub fn wire_word(self) -> &'static str {
		match self {
			GameResult::WhiteWin => "win",
			GameResult::BlackWin => "loss",
			GameResult::Draw => "draw",
		}
	}

	pub fn from_wire_word(word: &str) -> Option<GameResult> {
		match word {
			"win" => Some(GameResult::WhiteWin),
			"loss" => Some(GameResult::BlackWin),
			"draw" => Some(GameResult::Draw),
			_ => None,
		}
	}
}

impl Serialize for GameResult {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.wire_word())
	}
}

impl<'de> Deserialize<'de> for GameResult {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let word = String::deserialize(deserializer)?;
		GameResult::from_wire_word(&word).ok_or_else(|| D::Error::custom(format!("unknown result '{}'", word)))
	}
}

/// A one-way reference to a game: either an index into the header
/// store, or a byte offset into the PGN/BCGN source — never both.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GameRef {
	Index(u32),
	Offset(u64),
}

impl GameRef {
	fn raw(self) -> u64 {
		match self {
			GameRef::Index(i) => i as u64,
			GameRef::Offset(o) => o,
		}
	}

	/// `min(a, b)`. Both refs are assumed to be the same variant (one format
	/// never mixes index- and offset-shaped refs).
	pub fn combine_first(a: GameRef, b: GameRef) -> GameRef {
		if a.raw() <= b.raw() {
			a
		} else {
			b
		}
	}

	/// `max(a, b)`, the counterpart of [`GameRef::combine_first`].
	pub fn combine_last(a: GameRef, b: GameRef) -> GameRef {
		if a.raw() >= b.raw() {
			a
		} else {
			b
		}
	}
}

/// One 64-bit slot shared between `count` and a game offset. A 6-bit length prefix gives the number
/// of bits `count` currently occupies; the rest holds the offset. When
/// `count` grows enough to need every bit, the offset becomes the sentinel
/// "invalid" (`None`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PackedCountGameOffset(u64);

const PAYLOAD_BITS: u32 = 58;
const LEN_SHIFT: u32 = PAYLOAD_BITS;

fn bits_needed(value: u64) -> u32 {
	64 - value.leading_zeros()
}

impl PackedCountGameOffset {
	/// Builds a slot holding `count` and, if it still fits once `count`'s
	/// bit width is reserved, `offset`. An offset that no longer fits is
	/// dropped (becomes the `None` sentinel) rather than truncated.
	pub fn new(count: u64, offset: Option<u64>) -> PackedCountGameOffset {
		let max_count = (1u64 << PAYLOAD_BITS) - 1;
		let count = count.min(max_count);
		let count_bits = bits_needed(count).max(1).min(PAYLOAD_BITS);
		let offset_bits = PAYLOAD_BITS - count_bits;
		let offset = offset.filter(|o| offset_bits > 0 && bits_needed(*o) <= offset_bits).unwrap_or(0);
		let offset_mask = if offset_bits == 0 { 0 } else { (1u64 << offset_bits) - 1 };
		let payload = (count << offset_bits) | (offset & offset_mask);
		PackedCountGameOffset(((count_bits as u64) << LEN_SHIFT) | (payload & ((1u64 << PAYLOAD_BITS) - 1)))
	}

	fn count_bits(self) -> u32 {
		(self.0 >> LEN_SHIFT) as u32
	}

	pub fn count(self) -> u64 {
		let count_bits = self.count_bits();
		let offset_bits = PAYLOAD_BITS - count_bits;
		let mask = if count_bits >= 64 { u64::MAX } else { (1u64 << count_bits) - 1 };
		(self.0 >> offset_bits) & mask
	}

	pub fn offset(self) -> Option<u64> {
		let count_bits = self.count_bits();
		if count_bits >= PAYLOAD_BITS {
			return None;
		}
		let offset_bits = PAYLOAD_BITS - count_bits;
		Some(self.0 & ((1u64 << offset_bits) - 1))
	}

	pub fn combine(self, other: PackedCountGameOffset) -> PackedCountGameOffset {
		let new_count = self.count() + other.count();
		let new_offset = match (self.offset(), other.offset()) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(Some(a), None) => Some(a),
			(None, Some(b)) => Some(b),
			(None, None) => None,
		};
		PackedCountGameOffset::new(new_count, new_offset)
	}

	pub fn to_bits(self) -> u64 {
		self.0
	}
	pub fn from_bits(bits: u64) -> PackedCountGameOffset {
		PackedCountGameOffset(bits)
	}
}

/// The sortable prefix of an entry. `reverse_move` is `None`
/// for formats whose [`crate::format::Capabilities::has_reverse_move`] is
/// false; `level`/`result` are always present (folded into the key so sort
/// order groups `(hash, reverse_move, level, result)`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Key {
	pub hash: u64,
	pub reverse_move: Option<u32>,
	pub level: Level,
	pub result: GameResult,
	/// Physical-slice discriminant for smeared entries: `0` for a logical entry's first physical record, `1` for
	/// its continuation. Always `0` for non-smearing formats. Participates
	/// in [`Key::full_key`]/[`Key::full_equal`] (so a run file's sort/dedup
	/// keeps a logical entry's slices adjacent and distinct) but not in
	/// either reverse-move equivalence, which are logical and slice-blind.
	pub smear_slot: u8,
}

impl Key {
	pub fn simple(hash: u64, reverse_move: Option<u32>, level: Level, result: GameResult) -> Key {
		Key { hash, reverse_move, level, result, smear_slot: 0 }
	}

	/// `CompareLessFull`: the file's actual sort/dedup order.
	pub fn full_key(&self) -> (u64, u32, u8, u8, u8) {
		(self.hash, self.reverse_move.unwrap_or(0), self.level.bits(), self.result.bits(), self.smear_slot)
	}

	/// Keys with the same hash and reverse move are "continuations" of one
	/// another.
	pub fn with_reverse_move_equal(&self, other: &Key) -> bool {
		self.hash == other.hash && self.reverse_move == other.reverse_move
	}

	/// Keys with the same hash are "transpositions or continuations" of one
	/// another; this is also the order
	/// `index::RangeIndex::equal_range` brackets on.
	pub fn without_reverse_move_equal(&self, other: &Key) -> bool {
		self.hash == other.hash
	}

	pub fn full_equal(&self, other: &Key) -> bool {
		self.full_key() == other.full_key()
	}

	/// `CompareLessWithReverseMove`: query sort order.
	pub fn with_reverse_move_key(&self) -> (u64, u32) {
		(self.hash, self.reverse_move.unwrap_or(0))
	}

	/// `equal_range` compares without-reverse-move: retraction
	/// and transposition queries need every reverse-move variant of a hash
	/// in one contiguous range.
	pub fn without_reverse_move_key(&self) -> u64 {
		self.hash
	}
}

impl Ord for Key {
	fn cmp(&self, other: &Key) -> std::cmp::Ordering {
		self.full_key().cmp(&other.full_key())
	}
}
impl PartialOrd for Key {
	fn partial_cmp(&self, other: &Key) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn packed_count_offset_round_trip() {
		let p = PackedCountGameOffset::new(1, Some(12345));
		assert_eq!(p.count(), 1);
		assert_eq!(p.offset(), Some(12345));
	}

	#[test]
	fn packed_count_offset_combine_sums_and_keeps_min_offset() {
		let a = PackedCountGameOffset::new(3, Some(10));
		let b = PackedCountGameOffset::new(4, Some(20));
		let c = a.combine(b);
		assert_eq!(c.count(), 7);
		assert_eq!(c.offset(), Some(10));
	}

	#[test]
	fn packed_count_offset_saturates() {
		// Doubling 58 times would reach count = 2^58, one past what a
		// 58-bit payload can hold; the slot clamps instead of wrapping,
		// and the offset becomes the invalid sentinel once count alone
		// needs the full payload width.
		let mut value = PackedCountGameOffset::new(1, Some(7));
		for _ in 0..58 {
			value = value.combine(value);
		}
		assert_eq!(value.count(), (1u64 << 58) - 1);
		assert_eq!(value.offset(), None);
	}

	#[test]
	fn key_ordering_groups_by_hash_first() {
		let a = Key::simple(1, Some(5), Level::Server, GameResult::Draw);
		let b = Key::simple(2, Some(0), Level::Human, GameResult::WhiteWin);
		assert!(a < b);
	}

	#[test]
	fn equivalences_are_consistent() {
		let a = Key::simple(1, Some(5), Level::Human, GameResult::Draw);
		let b = Key::simple(1, Some(5), Level::Engine, GameResult::WhiteWin);
		let c = Key::simple(1, Some(9), Level::Human, GameResult::Draw);
		assert!(a.with_reverse_move_equal(&b));
		assert!(!a.full_equal(&b));
		assert!(a.without_reverse_move_equal(&c));
		assert!(!a.with_reverse_move_equal(&c));
	}
}

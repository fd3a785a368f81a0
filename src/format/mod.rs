// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-format entry layouts, grounded on
//! `original_source/src/persistence/pos_db/{alpha,beta,delta,epsilon}/DatabaseFormat*.h`.
//!
//! Design Note "Template/trait polymorphism over Key/Entry": rather than
//! compile-time capability detection, each format is a concrete type
//! implementing [`Entry`], and engine code that needs to know whether a
//! capability is present reads [`Capabilities`] instead of branching on the
//! concrete type.

pub mod alpha;
pub mod beta;
pub mod delta;
pub mod delta_smeared;
pub mod epsilon;

use serde::Deserialize as _;

use crate::entry::{GameRef, GameResult, Key, Level};
use crate::manifest::SemanticVersion;
use crate::reverse_move::REVERSE_MOVE_BITS;

/// Packs a reverse move plus `level`/`result` into one `u32`, the layout
/// `alpha`/`beta`/`delta` all share. `original_source`'s formats fold these
/// three fields into spare bits of the key's hash word (e.g.
/// `beta/DatabaseFormatBeta.h`'s `Hash:96, PackedReverseMove:27, GameLevel:2,
/// GameResult:2, padding:1`); this crate keeps the hash a plain `u64` field,
/// so the three fields get their own `u32` instead.
pub(crate) fn pack_reverse_move_meta(reverse_move: Option<u32>, level: Level, result: GameResult) -> u32 {
	let rm = reverse_move.unwrap_or(0) & ((1 << REVERSE_MOVE_BITS) - 1);
	rm | ((level.bits() as u32) << REVERSE_MOVE_BITS) | ((result.bits() as u32) << (REVERSE_MOVE_BITS + 2))
}

pub(crate) fn unpack_reverse_move_meta(meta: u32) -> (u32, Level, GameResult) {
	let rm = meta & ((1 << REVERSE_MOVE_BITS) - 1);
	let level = Level::from_bits((meta >> REVERSE_MOVE_BITS) as u8);
	let result = GameResult::from_bits((meta >> (REVERSE_MOVE_BITS + 2)) as u8);
	(rm, level, result)
}

/// Per-format bounds stamped into the manifest.
#[derive(Clone, Copy, Debug)]
pub struct Bounds {
	pub max_games: u64,
	pub max_positions: u64,
	pub max_instances_of_single_position: u64,
	pub max_abs_elo_diff: i64,
	pub min_elo: i32,
	pub max_elo: i32,
}

/// Per-format capability bits: every fetch-flag restriction is an explicit
/// bit here, checked once by `query::Engine` before execution, rather than
/// buried in per-format code.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
	pub allows_filtering_transpositions: bool,
	pub has_reverse_move: bool,
	pub has_first_game: bool,
	pub has_last_game: bool,
	pub has_elo_diff: bool,
	/// Which variant of [`crate::entry::GameRef`] this format's game
	/// references are (§3: "either a 32-bit index... or a 64-bit byte
	/// offset - never both"); lets `importer::Importer` build the right
	/// one without matching on the concrete entry type.
	pub game_ref_kind: GameRefKind,
}

/// Which shape of [`crate::entry::GameRef`] a format stores, or whether it
/// tracks game references at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GameRefKind {
	None,
	Index,
	Offset,
}

/// One fixed-size, trivially-copyable on-disk record.
///
/// A *physical* entry: for most formats this is also the logical entry a
/// query attributes to a position, but `delta_smeared`'s logical entry is a
/// short run of physical entries sharing one [`Key`]; `format::delta_smeared::unsmear` folds such a run back into
/// one logical view.
pub trait Entry: Clone + Copy + Send + Sync + 'static {
	/// On-disk record size in bytes (tested sizes: 16, 20, 24, 32).
	const SIZE: usize;
	const FORMAT_KEY: &'static str;
	const CURRENT_VERSION: SemanticVersion;
	const MINIMUM_SUPPORTED_VERSION: SemanticVersion;
	const REQUIRES_MATCHING_ENDIANNESS: bool;

	fn capabilities() -> Capabilities;
	fn bounds() -> Bounds;

	fn key(&self) -> Key;
	fn count(&self) -> u64;
	fn elo_diff(&self) -> Option<i64> {
		None
	}
	fn first_game_ref(&self) -> Option<GameRef> {
		None
	}
	fn last_game_ref(&self) -> Option<GameRef> {
		None
	}

	/// Merges `other`'s statistics into `self` (`other` is full-equal to
	/// `self`): sums `count`/`eloDiff`, min-first/max-last game ref, packed
	/// count saturates per `entry::PackedCountGameOffset`.
	fn combine(&mut self, other: &Self);

	fn to_bytes(&self, out: &mut [u8]);
	fn from_bytes(buf: &[u8]) -> Self;

	/// Constructs a fresh single-occurrence entry for one traversed position.
	fn new_single(key: Key, first_game: Option<GameRef>, elo_diff: Option<i64>) -> Self;

	/// The physical record(s) one freshly traversed position expands into.
	/// Every format except `delta_smeared` is
	/// one logical entry to one physical record, so the default just wraps
	/// [`Entry::new_single`]; `delta_smeared` overrides this to emit its
	/// four-record group via `format::delta_smeared::pack_group`, keeping the
	/// importer itself unaware that smearing exists.
	fn new_single_group(key: Key, first_game: Option<GameRef>, elo_diff: Option<i64>) -> Vec<Self> {
		vec![Self::new_single(key, first_game, elo_diff)]
	}
}

/// Which entries at a position's hash a query result bucket includes: grouped by how [`crate::entry::Key`]'s two reverse-move
/// equivalences relate to the move that was actually played to reach the
/// position being queried (`None` at a root with no incoming move means
/// "the start of a game", via [`crate::reverse_move::ReverseMove::Null`]).
///
/// - `Continuations`: entries whose reverse move equals the move played.
/// - `Transpositions`: entries whose reverse move differs - the same
///   position reached some other way.
/// - `All`: every entry at the hash, regardless of reverse move.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Select {
	Continuations,
	Transpositions,
	All,
}

impl Select {
	pub fn wire_word(self) -> &'static str {
		match self {
			Select::Continuations => "continuations",
			Select::Transpositions => "transpositions",
			Select::All => "all",
		}
	}

	pub fn from_wire_word(word: &str) -> Option<Select> {
		match word {
			"continuations" => Some(Select::Continuations),
			"transpositions" => Some(Select::Transpositions),
			"all" => Some(Select::All),
			_ => None,
		}
	}
}

impl serde::Serialize for Select {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.wire_word())
	}
}

impl<'de> serde::Deserialize<'de> for Select {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		use serde::de::Error as _;
		let word = String::deserialize(deserializer)?;
		Select::from_wire_word(&word).ok_or_else(|| D::Error::custom(format!("unknown select '{}'", word)))
	}
}

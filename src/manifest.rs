// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk manifest, grounded on
//! `original_source/src/persistence/pos_db/StorageHeader.h` (header framing)
//! and `original_source/src/util/SemanticVersion.h` (version ordering).

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ManifestError, Result};

/// `(major, minor, patch)` with the obvious lexicographic `Ord`, matching
/// `original_source/src/util/SemanticVersion.h`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SemanticVersion {
	pub major: u32,
	pub minor: u32,
	pub patch: u32,
}

impl SemanticVersion {
	pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
		SemanticVersion { major, minor, patch }
	}
}

impl std::fmt::Display for SemanticVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
	}
}

/// Byte order signature stamped into the manifest by the host that created
/// the store; checked against the host opening it when the format declares
/// `requires_matching_endianness`.
pub fn host_endianness_signature() -> u64 {
	// Distinct, recognizable patterns for the two byte orders; any constant
	// works as long as swapping it round-trips to a different value.
	if cfg!(target_endian = "little") {
		0x0123_4567_89ab_cdef
	} else {
		0xefcd_ab89_6745_2301
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
	pub name: String,
	pub version: SemanticVersion,
	pub endianness_signature: Option<u64>,
}

const MAGIC: &[u8; 4] = b"CPDB";

impl Manifest {
	pub fn new(name: impl Into<String>, version: SemanticVersion, requires_matching_endianness: bool) -> Manifest {
		Manifest {
			name: name.into(),
			version,
			endianness_signature: if requires_matching_endianness { Some(host_endianness_signature()) } else { None },
		}
	}

	fn manifest_path(root: &Path) -> std::path::PathBuf {
		root.join("manifest")
	}

	pub fn write(&self, root: &Path) -> Result<()> {
		let body = serde_json::to_vec_pretty(self)?;
		let mut file = std::fs::File::create(Self::manifest_path(root))?;
		file.write_all(MAGIC)?;
		file.write_all(&body)?;
		Ok(())
	}

	fn read(root: &Path) -> Result<Manifest> {
		let mut file = std::fs::File::open(Self::manifest_path(root))?;
		let mut buf = Vec::new();
		file.read_to_end(&mut buf)?;
		if buf.len() < MAGIC.len() || &buf[0..MAGIC.len()] != MAGIC {
			return Err(Error::ManifestValidation(ManifestError::InvalidManifest(
				"missing magic".into(),
			)));
		}
		serde_json::from_slice(&buf[MAGIC.len()..]).map_err(|e| {
			Error::ManifestValidation(ManifestError::InvalidManifest(e.to_string()))
		})
	}

	/// Validates an existing manifest, or writes a fresh one if the store
	/// directory has none yet.
	pub fn create_or_validate(
		root: &Path,
		format_key: &str,
		current_version: SemanticVersion,
		minimum_supported_version: SemanticVersion,
		requires_matching_endianness: bool,
	) -> Result<Manifest> {
		let path = Self::manifest_path(root);
		if !path.exists() {
			let manifest = Manifest::new(format_key, current_version, requires_matching_endianness);
			std::fs::create_dir_all(root)?;
			manifest.write(root)?;
			log::info!(target: "chesspos_db", "created manifest for {} at {}, version {}", format_key, root.display(), current_version);
			return Ok(manifest);
		}

		let manifest = Self::read(root)?;
		if manifest.name != format_key {
			log::warn!(target: "chesspos_db", "manifest key mismatch at {}: expected {}, found {}", root.display(), format_key, manifest.name);
			return Err(Error::ManifestValidation(ManifestError::KeyMismatch {
				expected: format_key.to_string(),
				found: manifest.name.clone(),
			}));
		}
		if manifest.version < minimum_supported_version {
			log::warn!(target: "chesspos_db", "manifest version too old at {}: found {}, need at least {}", root.display(), manifest.version, minimum_supported_version);
			return Err(Error::ManifestValidation(ManifestError::UnsupportedVersion {
				minimum: minimum_supported_version,
				found: manifest.version,
			}));
		}
		if requires_matching_endianness {
			match manifest.endianness_signature {
				Some(sig) if sig == host_endianness_signature() => {}
				_ => {
					log::warn!(target: "chesspos_db", "manifest endianness mismatch at {}", root.display());
					return Err(Error::ManifestValidation(ManifestError::EndiannessMismatch));
				}
			}
		}
		log::debug!(target: "chesspos_db", "validated manifest for {} at {}", format_key, root.display());
		Ok(manifest)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("manifest");
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

	#[test]
	fn creates_then_validates() {
		let dir = TempDir::new("creates_then_validates");
		let m1 = Manifest::create_or_validate(
			&dir.0, "db_epsilon", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), false,
		).unwrap();
		assert_eq!(m1.name, "db_epsilon");
		let m2 = Manifest::create_or_validate(
			&dir.0, "db_epsilon", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), false,
		).unwrap();
		assert_eq!(m2.name, "db_epsilon");
	}

	#[test]
	fn key_mismatch() {
		let dir = TempDir::new("key_mismatch");
		Manifest::create_or_validate(
			&dir.0, "db_alpha", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), false,
		).unwrap();
		let err = Manifest::create_or_validate(
			&dir.0, "db_beta", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), false,
		).unwrap_err();
		assert!(matches!(err, Error::ManifestValidation(ManifestError::KeyMismatch { .. })));
	}

	#[test]
	fn endianness_mismatch() {
		let dir = TempDir::new("endianness_mismatch");
		let mut manifest = Manifest::new("db_delta", SemanticVersion::new(1, 0, 0), true);
		manifest.endianness_signature = Some(!manifest.endianness_signature.unwrap());
		std::fs::create_dir_all(&dir.0).unwrap();
		manifest.write(&dir.0).unwrap();

		let err = Manifest::create_or_validate(
			&dir.0, "db_delta", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), true,
		).unwrap_err();
		assert!(matches!(err, Error::ManifestValidation(ManifestError::EndiannessMismatch)));
	}

	#[test]
	fn unsupported_version() {
		let dir = TempDir::new("unsupported_version");
		Manifest::create_or_validate(
			&dir.0, "db_alpha", SemanticVersion::new(1, 0, 0), SemanticVersion::new(1, 0, 0), false,
		).unwrap();
		let err = Manifest::create_or_validate(
			&dir.0, "db_alpha", SemanticVersion::new(1, 0, 0), SemanticVersion::new(2, 0, 0), false,
		).unwrap_err();
		assert!(matches!(err, Error::ManifestValidation(ManifestError::UnsupportedVersion { .. })));
	}
}

// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// The four error kinds of the position-database core.
#[derive(Debug)]
pub enum Error {
	/// Opening an existing store against a manifest that does not match.
	ManifestValidation(ManifestError),
	/// Bad FEN/SAN/query shape, rejected at the boundary.
	InvalidInput(String),
	/// Filesystem operation failed.
	Io(std::io::Error),
	/// A failed internal-consistency assertion. Fatal; never retried.
	Corruption(String),
}

/// Why `manifest::Manifest::validate` refused to open a store.
#[derive(Debug, Eq, PartialEq)]
pub enum ManifestError {
	KeyMismatch { expected: String, found: String },
	UnsupportedVersion { minimum: crate::manifest::SemanticVersion, found: crate::manifest::SemanticVersion },
	EndiannessMismatch,
	InvalidManifest(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::ManifestValidation(e) => write!(f, "manifest validation failed: {}", e),
			Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
			Error::Io(e) => write!(f, "io error: {}", e),
			Error::Corruption(msg) => write!(f, "corruption: {}", msg),
		}
	}
}

impl fmt::Display for ManifestError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ManifestError::KeyMismatch { expected, found } =>
				write!(f, "expected format '{}', found '{}'", expected, found),
			ManifestError::UnsupportedVersion { minimum, found } =>
				write!(f, "store version {} is older than the minimum supported version {}", found, minimum),
			ManifestError::EndiannessMismatch =>
				write!(f, "store was written on a host with different byte order"),
			ManifestError::InvalidManifest(msg) => write!(f, "invalid manifest: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Error {
		Error::ManifestValidation(ManifestError::InvalidManifest(e.to_string()))
	}
}

pub type Result<T> = std::result::Result<T, Error>;

// SPDX-License-Identifier: MIT OR Apache-2.0

/// Hex-formats a byte slice for tracing, e.g. `hex(key)` in a `log::trace!`.
pub fn hex(buf: &[u8]) -> String {
	hex::encode(buf)
}

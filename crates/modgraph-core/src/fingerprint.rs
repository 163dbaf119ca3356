//! Content fingerprints for change detection.
//!
//! A fingerprint is a BLAKE3 hash of a unit's extracted content, rendered as
//! `b3:<hex>`. Hashing content rather than comparing modification times
//! tolerates touch-without-edit and cross-machine clock skew.

use std::fs;
use std::io;
use std::path::Path;

/// Prefix on every rendered fingerprint, so stored values are self-describing.
pub const FINGERPRINT_PREFIX: &str = "b3:";

/// Fingerprint a byte slice.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{FINGERPRINT_PREFIX}{}", blake3::hash(bytes).to_hex())
}

/// Fingerprint a string slice.
#[must_use]
pub fn fingerprint_str(s: &str) -> String {
    fingerprint_bytes(s.as_bytes())
}

/// Fingerprint a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(fingerprint_bytes(&bytes))
}

/// Returns `true` if `s` looks like a rendered fingerprint.
#[must_use]
pub fn is_fingerprint(s: &str) -> bool {
    s.strip_prefix(FINGERPRINT_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

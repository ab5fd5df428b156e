use crate::canonical::canonical_message;
use error_collector_protocol::{Category, ErrorSource};
use sha2::{Digest, Sha256};

/// SHA-256 (lower hex) over the canonical message, category and source.
///
/// Fields are separated by NUL so that no field can bleed into its neighbour.
pub fn fingerprint(message: &str, category: Category, source: ErrorSource) -> String {
    const DELIMITER: &[u8] = b"\x00";

    let mut hasher = Sha256::new();
    hasher.update(canonical_message(message).as_bytes());
    hasher.update(DELIMITER);
    hasher.update(category.as_str().as_bytes());
    hasher.update(DELIMITER);
    hasher.update(source.as_str().as_bytes());
    hex_encode_lower(&hasher.finalize())
}

pub fn hex_encode_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

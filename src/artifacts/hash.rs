//! Content checksums for artifact versions.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute the SHA256 checksum of a serializable value.
///
/// The value is serialized to JSON before hashing; `serde_json` keeps object
/// keys sorted, so equal documents always hash equally.
/// Returns a 64-character lowercase hexadecimal string.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(hash_bytes(&json))
}

/// SHA256 of raw bytes as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

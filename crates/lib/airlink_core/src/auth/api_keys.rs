//! API key generation and hashing.
//!
//! Plaintext keys are shown to the operator once; stores only ever see the
//! SHA-256 hex digest.

use sha2::{Digest, Sha256};

/// Generate a new API key: 32 random bytes, hex-encoded (64 chars).
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 hash an API key for storage and lookup.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

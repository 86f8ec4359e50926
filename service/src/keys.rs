//! API key generation and hashing.
//!
//! Plaintext keys are shown once at mint time; only the SHA-256 hex digest
//! is stored, and lookups hash the presented key before hitting the store.

use sha2::{Digest, Sha256};

/// Prefix carried by every minted key, so leaked keys are recognizable.
const KEY_PREFIX: &str = "tly_";

/// Generate a new plaintext API key.
#[must_use]
pub fn generate_api_key() -> String {
    let a = uuid::Uuid::new_v4().simple();
    let b = uuid::Uuid::new_v4().simple();
    format!("{KEY_PREFIX}{a}{b}")
}

/// SHA-256 hex digest of a plaintext key, as stored at rest.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare two secrets without short-circuiting on the first differing
/// byte. Both sides are hashed first, so length differences leak nothing.
#[must_use]
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    hash_api_key(presented) == hash_api_key(expected)
}

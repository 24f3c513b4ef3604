//! API key generation and hashing.

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a generated key.
const KEY_ENTROPY_BYTES: usize = 32;

/// Generate a new API key.
///
/// Format: URL-safe base64 of 32 random bytes, then `_` and the creation time
/// in Unix nanoseconds.
#[must_use]
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut bytes);

    let encoded = base64_url::encode(&bytes);
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();

    format!("{encoded}_{timestamp}")
}

/// Hash an API key for storage and lookup.
#[must_use]
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

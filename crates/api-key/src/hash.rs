//! PBKDF2-HMAC-SHA256 hashing for API keys.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::config::ApiKeyConfig;

/// Derived key length in bytes (one SHA-256 block).
const HASH_LENGTH: usize = 32;

/// Hash an API key with its salt using the default work factor.
///
/// Deterministic: the same `(api_key, salt)` always yields the same
/// lowercase hex string.
pub fn hash_api_key(api_key: &str, salt: &str) -> String {
    hash_api_key_with(api_key, salt, &ApiKeyConfig::default())
}

/// Hash an API key with an explicit configuration.
pub fn hash_api_key_with(api_key: &str, salt: &str, config: &ApiKeyConfig) -> String {
    let mut derived = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(
        api_key.as_bytes(),
        salt.as_bytes(),
        config.iterations,
        &mut derived,
    );
    hex::encode(derived)
}

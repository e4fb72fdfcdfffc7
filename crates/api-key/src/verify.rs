//! Credential verification with constant-time comparison.

use subtle::ConstantTimeEq;

use crate::config::ApiKeyConfig;
use crate::data::Credential;
use crate::hash::hash_api_key_with;

/// Verify a presented key against a stored hash and salt.
///
/// Re-derives the hash from `api_key` and `salt`, then compares it to
/// `stored_hash` in constant time.
pub fn verify_api_key(api_key: &str, stored_hash: &str, salt: &str) -> bool {
    verify_api_key_with(api_key, stored_hash, salt, &ApiKeyConfig::default())
}

/// Same as [`verify_api_key`] with an explicit configuration.
pub fn verify_api_key_with(
    api_key: &str,
    stored_hash: &str,
    salt: &str,
    config: &ApiKeyConfig,
) -> bool {
    let computed_hash = hash_api_key_with(api_key, salt, config);
    hashes_equal(computed_hash.as_bytes(), stored_hash.as_bytes())
}

/// Verify a presented key against a stored [`Credential`].
pub fn verify_credential(api_key: &str, credential: &Credential, config: &ApiKeyConfig) -> bool {
    verify_api_key_with(api_key, &credential.key_hash, &credential.salt, config)
}

/// Constant-time comparison of two hashes.
///
/// Slices of different length compare unequal; length is not secret here.
fn hashes_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

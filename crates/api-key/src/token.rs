//! API key and salt generation.

use data_encoding::BASE64URL_NOPAD;
use rand::{CryptoRng, RngCore};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::config::ApiKeyConfig;
use crate::data::{Credential, GeneratedKey, RawApiKey};
use crate::error::{ApiKeyError, Result};
use crate::format::API_KEY_LENGTH;
use crate::hash::hash_api_key_with;

/// Random bytes drawn per key. Encodes to 43 characters before truncation.
const KEY_ENTROPY_BYTES: usize = 32;

/// Random bytes drawn per salt.
const SALT_BYTES: usize = 16;

fn fill_secure<R: RngCore + CryptoRng + ?Sized>(rng: &mut R, buf: &mut [u8]) -> Result<()> {
    rng.try_fill_bytes(buf)
        .map_err(ApiKeyError::CredentialSourceUnavailable)
}

fn api_key_from<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<RawApiKey> {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    fill_secure(rng, &mut bytes)?;

    let mut encoded = BASE64URL_NOPAD.encode(&bytes);
    bytes.zeroize();

    encoded.truncate(API_KEY_LENGTH);
    Ok(RawApiKey::new(encoded))
}

fn salt_from<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<String> {
    let mut bytes = [0u8; SALT_BYTES];
    fill_secure(rng, &mut bytes)?;
    Ok(BASE64URL_NOPAD.encode(&bytes))
}

/// Generate a new 32-character API key.
pub fn generate_api_key() -> Result<RawApiKey> {
    api_key_from(&mut OsRng)
}

/// Generate a new salt (22 URL-safe characters).
pub fn generate_salt() -> Result<String> {
    salt_from(&mut OsRng)
}

/// Generate a key together with the credential to store for it.
///
/// Pure computation: persisting the credential is the caller's job.
pub fn generate_api_key_with_hash() -> Result<GeneratedKey> {
    generate_api_key_with_hash_using(&ApiKeyConfig::default())
}

/// Same as [`generate_api_key_with_hash`] with an explicit configuration.
pub fn generate_api_key_with_hash_using(config: &ApiKeyConfig) -> Result<GeneratedKey> {
    generate_api_key_with_hash_from(&mut OsRng, config)
}

/// Same as [`generate_api_key_with_hash_using`], drawing from `rng`.
pub fn generate_api_key_with_hash_from<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    config: &ApiKeyConfig,
) -> Result<GeneratedKey> {
    let api_key = api_key_from(rng)?;
    let salt = salt_from(rng)?;
    let key_hash = hash_api_key_with(api_key.as_str(), &salt, config);

    Ok(GeneratedKey {
        api_key,
        credential: Credential::new(key_hash, salt),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::format::is_valid_api_key_format;
    use crate::hash::hash_api_key;

    #[test]
    fn test_generate_key_format() {
        for _ in 0..100 {
            let key = generate_api_key().unwrap();
            assert_eq!(key.as_str().len(), 32);
            assert!(is_valid_api_key_format(key.as_str()));
        }
    }

    #[test]
    fn test_generate_unique_keys() {
        let key1 = generate_api_key().unwrap();
        let key2 = generate_api_key().unwrap();
        assert_ne!(key1.as_str(), key2.as_str());
    }

    #[test]
    fn test_salt_length_and_alphabet() {
        let salt = generate_salt().unwrap();
        assert_eq!(salt.len(), 22);
        assert!(
            salt.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
    }

    #[test]
    fn test_salts_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_salt().unwrap()));
        }
    }

    #[test]
    fn test_generate_with_hash_matches_default_hash() {
        let generated = generate_api_key_with_hash().unwrap();
        let expected = hash_api_key(generated.api_key.as_str(), &generated.credential.salt);
        assert_eq!(generated.credential.key_hash, expected);
    }

    #[test]
    fn test_into_parts_order() {
        let config = ApiKeyConfig::with_iterations(10);
        let generated = generate_api_key_with_hash_using(&config).unwrap();
        let credential = generated.credential.clone();

        let (key, hash, salt) = generated.into_parts();
        assert!(is_valid_api_key_format(key.as_str()));
        assert_eq!(hash, credential.key_hash);
        assert_eq!(salt, credential.salt);
    }

    /// An RNG whose entropy source is gone.
    struct ExhaustedRng;

    impl RngCore for ExhaustedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new("entropy source unavailable"))
        }
    }

    impl CryptoRng for ExhaustedRng {}

    #[test]
    fn test_unavailable_rng_is_an_error() {
        let result =
            generate_api_key_with_hash_from(&mut ExhaustedRng, &ApiKeyConfig::with_iterations(1));
        assert!(matches!(
            result,
            Err(ApiKeyError::CredentialSourceUnavailable(_))
        ));
    }
}

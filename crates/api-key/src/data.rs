//! Credential types.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A freshly minted API key in plaintext.
///
/// Shown to the user once and never stored. The buffer is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RawApiKey(String);

impl RawApiKey {
    pub(crate) fn new(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawApiKey(<redacted>)")
    }
}

impl AsRef<str> for RawApiKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Data to store in the database for an API key.
///
/// Hash and salt only ever travel together: a credential is either fully
/// present or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Hex-encoded PBKDF2-HMAC-SHA256 digest.
    pub key_hash: String,
    /// URL-safe base64 salt.
    pub salt: String,
}

impl Credential {
    pub fn new(key_hash: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            key_hash: key_hash.into(),
            salt: salt.into(),
        }
    }

    /// Build a credential from two nullable columns.
    ///
    /// Returns `None` unless both halves are present.
    pub fn from_parts(key_hash: Option<String>, salt: Option<String>) -> Option<Self> {
        match (key_hash, salt) {
            (Some(key_hash), Some(salt)) => Some(Self { key_hash, salt }),
            _ => None,
        }
    }
}

/// Output of [`generate_api_key_with_hash`](crate::generate_api_key_with_hash).
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// The key to hand to the user (only shown once!).
    pub api_key: RawApiKey,
    /// The hash and salt to persist.
    pub credential: Credential,
}

impl GeneratedKey {
    /// Split into the `(key, hash, salt)` triple.
    pub fn into_parts(self) -> (RawApiKey, String, String) {
        (self.api_key, self.credential.key_hash, self.credential.salt)
    }
}

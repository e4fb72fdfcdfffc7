//! Cryptographically-secure API key generation and verification.
//!
//! This crate provides functionality for:
//! - Generating 32-character URL-safe API keys and per-key salts
//! - Hashing keys with PBKDF2-HMAC-SHA256 (100,000 iterations)
//! - Verifying presented keys against stored hashes in constant time
//! - A cheap format check to reject malformed keys before hashing
//!
//! # Key Format
//!
//! A key is the first 32 characters of the URL-safe base64 encoding
//! (`A-Z a-z 0-9 - _`) of 32 random bytes. Only the salted hash is stored.
//!
//! # Example
//!
//! ```rust
//! use api_key::{generate_api_key_with_hash, is_valid_api_key_format, verify_api_key};
//!
//! // Generate a new API key
//! let generated = generate_api_key_with_hash().unwrap();
//!
//! // Give the key to the user (only shown once!)
//! println!("Your API key: {}", generated.api_key.as_str());
//!
//! // Store generated.credential in your database...
//!
//! // Later, verify the key
//! let presented = generated.api_key.as_str();
//! assert!(is_valid_api_key_format(presented));
//! assert!(verify_api_key(
//!     presented,
//!     &generated.credential.key_hash,
//!     &generated.credential.salt,
//! ));
//! ```

mod config;
mod data;
mod error;
mod format;
mod hash;
mod token;
mod verify;

// Public re-exports
pub use config::{ApiKeyConfig, PBKDF2_ITERATIONS};
pub use data::{Credential, GeneratedKey, RawApiKey};
pub use error::{ApiKeyError, Result};
pub use format::{API_KEY_LENGTH, is_valid_api_key_format};
pub use hash::{hash_api_key, hash_api_key_with};
pub use token::{
    generate_api_key, generate_api_key_with_hash, generate_api_key_with_hash_from,
    generate_api_key_with_hash_using, generate_salt,
};
pub use verify::{verify_api_key, verify_api_key_with, verify_credential};

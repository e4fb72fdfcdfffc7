//! Error types for API key operations.

use thiserror::Error;

/// Errors that can occur during API key operations.
#[derive(Debug, Error)]
pub enum ApiKeyError {
    /// The OS random source could not produce bytes. Not retryable.
    #[error("Secure random source unavailable")]
    CredentialSourceUnavailable(#[source] rand::Error),
}

/// Result type alias for API key operations.
pub type Result<T> = std::result::Result<T, ApiKeyError>;

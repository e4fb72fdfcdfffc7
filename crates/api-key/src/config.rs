//! Configuration for API key hashing.

/// PBKDF2 work factor for every stored credential.
///
/// Changing this value invalidates all existing hashes unless every
/// credential is re-hashed, so treat it as a versioned parameter.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Configuration for API key hashing and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyConfig {
    /// PBKDF2-HMAC-SHA256 iteration count.
    pub iterations: u32,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl ApiKeyConfig {
    /// Create a config with a custom iteration count.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

//! Error types for account storage, authentication and registration.

use api_key::ApiKeyError;
use thiserror::Error;

/// Errors raised by an [`AccountSource`](crate::accounts::AccountSource).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("account {0} not found")]
    NotFound(i64),

    #[error("account {0} already exists")]
    Duplicate(String),

    #[error("account store lock poisoned")]
    Poisoned,
}

/// Why a request did not authenticate. Internal diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Neither header carried a credential.
    Missing,
    /// A credential was supplied but cannot be a valid key.
    Malformed,
    /// Well-formed, but no active account verifies it.
    NoMatch,
}

impl AuthFailure {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "<missing>",
            AuthFailure::Malformed => "<malformed>",
            AuthFailure::NoMatch => "<no_match>",
        }
    }
}

/// Errors returned by [`Authenticator`](crate::auth::Authenticator).
///
/// Every `Unauthenticated` renders the same message whatever the reason.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed")]
    Unauthenticated { reason: AuthFailure },

    /// The account is authenticated but may not use the API.
    #[error("access forbidden")]
    Forbidden,

    #[error("account lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub(crate) fn unauthenticated(reason: AuthFailure) -> Self {
        AuthError::Unauthenticated { reason }
    }

    /// The internal failure reason, if this is an authentication failure.
    pub fn reason(&self) -> Option<AuthFailure> {
        match self {
            AuthError::Unauthenticated { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors returned by [`Registrar`](crate::registration::Registrar).
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("username must be at least 3 characters long")]
    InvalidUsername,

    #[error("account not found")]
    AccountNotFound,

    #[error("account is already registered")]
    AlreadyRegistered,

    #[error("credential generation failed: {0}")]
    CredentialSourceUnavailable(#[from] ApiKeyError),

    #[error("account store error: {0}")]
    Store(#[from] StoreError),
}

impl RegistrationError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationError::InvalidUsername => "INVALID_USERNAME_FORMAT",
            RegistrationError::AccountNotFound => "USERNAME_NOT_FOUND",
            RegistrationError::AlreadyRegistered => "USER_ALREADY_REGISTERED",
            RegistrationError::CredentialSourceUnavailable(_) | RegistrationError::Store(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

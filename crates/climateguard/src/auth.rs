//! Request authentication by API key.
//!
//! A key is read from `X-API-Key`, or failing that from an
//! `Authorization: Bearer <key>` header. Only salted hashes are stored, with
//! a salt per account, so resolving a key scans every candidate account and
//! verifies against each until one matches. This is O(accounts) per request.

use std::fmt;
use std::sync::Arc;

use api_key::{ApiKeyConfig, is_valid_api_key_format, verify_credential};
use chrono::Utc;

use crate::accounts::{Account, AccountSource};
use crate::error::{AuthError, AuthFailure};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Raw credential headers of one request, as received.
#[derive(Clone, Default)]
pub struct PresentedCredentials {
    /// Value of the `X-API-Key` header.
    pub api_key: Option<String>,
    /// Value of the `Authorization` header.
    pub authorization: Option<String>,
}

impl fmt::Debug for PresentedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentedCredentials")
            .field("has_api_key", &self.api_key.is_some())
            .field("has_authorization", &self.authorization.is_some())
            .finish()
    }
}

impl PresentedCredentials {
    pub fn new(api_key: Option<&str>, authorization: Option<&str>) -> Self {
        Self {
            api_key: api_key.map(str::to_string),
            authorization: authorization.map(str::to_string),
        }
    }

    /// Credentials carrying only an `X-API-Key` header.
    pub fn from_api_key(api_key: &str) -> Self {
        Self::new(Some(api_key), None)
    }

    /// Credentials carrying only an `Authorization: Bearer` header.
    pub fn from_bearer(token: &str) -> Self {
        Self {
            api_key: None,
            authorization: Some(format!("Bearer {token}")),
        }
    }

    /// The presented key, preferring `X-API-Key` over the bearer token.
    ///
    /// Empty values count as absent.
    pub fn extract_api_key(&self) -> Option<&str> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            log::debug!("API key extracted from X-API-Key header");
            return Some(key);
        }

        let token = self.authorization.as_deref().and_then(bearer_token)?;
        log::debug!("API key extracted from Authorization header");
        Some(token)
    }
}

/// Credential portion of an `Authorization` header using the Bearer scheme.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, credentials) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credentials = credentials.trim();
    (!credentials.is_empty()).then_some(credentials)
}

/// Resolves presented API keys to accounts.
pub struct Authenticator<S> {
    source: Arc<S>,
    config: ApiKeyConfig,
}

impl<S> fmt::Debug for Authenticator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish()
    }
}

impl<S: AccountSource> Authenticator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_config(source, ApiKeyConfig::default())
    }

    pub fn with_config(source: Arc<S>, config: ApiKeyConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Resolve the request's credentials to an account.
    ///
    /// On success the account's last login is updated on a best-effort
    /// basis; a failed write is logged and does not fail the request.
    pub fn authenticate(&self, credentials: &PresentedCredentials) -> Result<Account, AuthError> {
        let Some(api_key) = credentials.extract_api_key() else {
            log::warn!("Authentication failed: no API key provided");
            return Err(AuthError::unauthenticated(AuthFailure::Missing));
        };

        if !is_valid_api_key_format(api_key) {
            log::warn!("Authentication failed: invalid API key format");
            return Err(AuthError::unauthenticated(AuthFailure::Malformed));
        }

        let candidates = self.source.find_candidates()?;
        log::debug!("Scanning {} candidate accounts", candidates.len());

        // First match wins
        let matched = candidates.into_iter().find(|account| {
            account.is_candidate()
                && account
                    .credential
                    .as_ref()
                    .is_some_and(|c| verify_credential(api_key, c, &self.config))
        });

        let Some(mut account) = matched else {
            log::warn!("Authentication failed: invalid API key");
            return Err(AuthError::unauthenticated(AuthFailure::NoMatch));
        };

        log::info!("Authentication successful for user: {}", account.username);

        let now = Utc::now();
        match self.source.record_login(account.id, now) {
            Ok(()) => account.last_login = Some(now),
            Err(e) => log::warn!(
                "Failed to record login for user {}: {}",
                account.username,
                e
            ),
        }

        Ok(account)
    }

    /// Like [`authenticate`](Self::authenticate), but `None` on any failure.
    pub fn authenticate_optional(&self, credentials: &PresentedCredentials) -> Option<Account> {
        self.authenticate(credentials).ok()
    }
}

/// Reject accounts that are no longer active or registered.
pub fn ensure_active(account: &Account) -> Result<(), AuthError> {
    if !account.is_active {
        log::warn!("Access denied: user {} is not active", account.username);
        return Err(AuthError::Forbidden);
    }
    if !account.is_registered {
        log::warn!("Access denied: user {} is not registered", account.username);
        return Err(AuthError::Forbidden);
    }
    Ok(())
}

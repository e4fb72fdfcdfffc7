//! Account registration and API key regeneration.
//!
//! Accounts are pre-created by an administrator. Registration mints the
//! first key for such an account; regeneration replaces it. The raw key is
//! returned to the caller exactly once and never persisted.

use std::fmt;
use std::sync::Arc;

use api_key::{ApiKeyConfig, GeneratedKey, generate_api_key_with_hash_using};

type KeyGenerator = fn(&ApiKeyConfig) -> api_key::Result<GeneratedKey>;
use chrono::Utc;

use crate::accounts::{Account, AccountSource};
use crate::error::RegistrationError;

/// Minimum username length after trimming.
const MIN_USERNAME_LEN: usize = 3;

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registration {
    /// The account as it is after registration.
    pub account: Account,
    /// The newly issued key and its stored credential.
    pub key: GeneratedKey,
}

/// Issues API keys for accounts.
pub struct Registrar<S> {
    source: Arc<S>,
    config: ApiKeyConfig,
    keygen: KeyGenerator,
}

impl<S> fmt::Debug for Registrar<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("config", &self.config)
            .finish()
    }
}

impl<S: AccountSource> Registrar<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_config(source, ApiKeyConfig::default())
    }

    pub fn with_config(source: Arc<S>, config: ApiKeyConfig) -> Self {
        Self {
            source,
            config,
            keygen: generate_api_key_with_hash_using,
        }
    }

    #[cfg(test)]
    fn with_key_generator(mut self, keygen: KeyGenerator) -> Self {
        self.keygen = keygen;
        self
    }

    /// Register a pre-created account and issue its first API key.
    ///
    /// An optional `email` replaces the stored address.
    pub fn register(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<Registration, RegistrationError> {
        log::info!("Registration attempt for username: {}", username);

        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_LEN {
            log::warn!("Registration failed: invalid username format");
            return Err(RegistrationError::InvalidUsername);
        }

        let Some(mut account) = self.source.find_account_by_username(username)? else {
            log::warn!("Registration failed: username '{}' not found", username);
            return Err(RegistrationError::AccountNotFound);
        };

        if account.is_registered || account.credential.is_some() {
            log::warn!("Registration failed: user '{}' already registered", username);
            return Err(RegistrationError::AlreadyRegistered);
        }

        // Nothing is written if generation fails
        let key = (self.keygen)(&self.config)?;
        let now = Utc::now();

        if !self
            .source
            .complete_registration(account.id, &key.credential, email, now)?
        {
            log::warn!(
                "Registration failed: user '{}' registered concurrently",
                username
            );
            return Err(RegistrationError::AlreadyRegistered);
        }

        account.credential = Some(key.credential.clone());
        account.is_active = true;
        account.is_registered = true;
        account.registered_at = Some(now);
        if let Some(email) = email {
            account.email = Some(email.to_string());
        }

        log::info!("Registration successful for user: {}", account.username);
        Ok(Registration { account, key })
    }

    /// Replace the account's API key. The old key stops working as soon as
    /// the new credential is stored.
    pub fn regenerate(&self, account: &Account) -> Result<GeneratedKey, RegistrationError> {
        log::info!("API key regeneration for user: {}", account.username);

        let key = (self.keygen)(&self.config)?;
        self.source.update_credential(account.id, &key.credential)?;

        log::info!(
            "API key regenerated successfully for user: {}",
            account.username
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccountStore;
    use crate::auth::{Authenticator, PresentedCredentials};
    use crate::error::AuthFailure;
    use api_key::{generate_api_key_with_hash_from, is_valid_api_key_format, verify_credential};
    use rand::{CryptoRng, RngCore};

    fn test_config() -> ApiKeyConfig {
        ApiKeyConfig::with_iterations(10)
    }

    fn setup(usernames: &[&str]) -> (Arc<MemoryAccountStore>, Registrar<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        for name in usernames {
            store.create_account(name, None).unwrap();
        }
        let registrar = Registrar::with_config(store.clone(), test_config());
        (store, registrar)
    }

    #[test]
    fn test_register_issues_key_and_activates() {
        let (store, registrar) = setup(&["alice"]);

        let registration = registrar.register("alice", Some("alice@example.com")).unwrap();
        assert!(is_valid_api_key_format(registration.key.api_key.as_str()));
        assert!(registration.account.is_active);
        assert!(registration.account.is_registered);
        assert_eq!(registration.account.email.as_deref(), Some("alice@example.com"));

        let stored = store.get(registration.account.id).unwrap().unwrap();
        assert_eq!(stored.credential.as_ref(), Some(&registration.key.credential));
        assert!(stored.registered_at.is_some());
        assert!(verify_credential(
            registration.key.api_key.as_str(),
            stored.credential.as_ref().unwrap(),
            &test_config(),
        ));
    }

    #[test]
    fn test_register_trims_username() {
        let (_store, registrar) = setup(&["alice"]);
        let registration = registrar.register("  alice ", None).unwrap();
        assert_eq!(registration.account.username, "alice");
    }

    #[test]
    fn test_register_rejects_short_username() {
        let (_store, registrar) = setup(&["al"]);
        assert!(matches!(
            registrar.register("al", None),
            Err(RegistrationError::InvalidUsername)
        ));
        assert!(matches!(
            registrar.register("   ", None),
            Err(RegistrationError::InvalidUsername)
        ));
    }

    #[test]
    fn test_register_unknown_account() {
        let (_store, registrar) = setup(&["alice"]);
        let err = registrar.register("mallory", None).unwrap_err();
        assert!(matches!(err, RegistrationError::AccountNotFound));
        assert_eq!(err.code(), "USERNAME_NOT_FOUND");
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let (store, registrar) = setup(&["alice"]);
        let first = registrar.register("alice", None).unwrap();

        let err = registrar.register("alice", None).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyRegistered));
        assert_eq!(err.code(), "USER_ALREADY_REGISTERED");

        // The original credential is untouched
        let stored = store.get(first.account.id).unwrap().unwrap();
        assert_eq!(stored.credential.as_ref(), Some(&first.key.credential));
    }

    #[test]
    fn test_registered_key_authenticates() {
        let (store, registrar) = setup(&["alice"]);
        let registration = registrar.register("alice", None).unwrap();
        let auth = Authenticator::with_config(store, test_config());

        let account = auth
            .authenticate(&PresentedCredentials::from_api_key(
                registration.key.api_key.as_str(),
            ))
            .unwrap();
        assert_eq!(account.username, "alice");
    }

    #[test]
    fn test_regenerate_invalidates_old_key() {
        let (store, registrar) = setup(&["alice"]);
        let registration = registrar.register("alice", None).unwrap();
        let old_key = registration.key.api_key.clone();

        let new = registrar.regenerate(&registration.account).unwrap();
        assert_ne!(old_key.as_str(), new.api_key.as_str());
        assert!(!verify_credential(old_key.as_str(), &new.credential, &test_config()));

        let auth = Authenticator::with_config(store, test_config());
        let old_result = auth.authenticate(&PresentedCredentials::from_api_key(old_key.as_str()));
        assert_eq!(
            old_result.unwrap_err().reason(),
            Some(AuthFailure::NoMatch)
        );

        let account = auth
            .authenticate(&PresentedCredentials::from_api_key(new.api_key.as_str()))
            .unwrap();
        assert_eq!(account.username, "alice");
    }

    #[test]
    fn test_two_accounts_get_distinct_salts() {
        let (store, registrar) = setup(&["alice", "bob"]);
        let alice = registrar.register("alice", None).unwrap();
        let bob = registrar.register("bob", None).unwrap();
        assert_ne!(alice.key.credential.salt, bob.key.credential.salt);

        let auth = Authenticator::with_config(store, test_config());
        let resolved = auth
            .authenticate(&PresentedCredentials::from_api_key(alice.key.api_key.as_str()))
            .unwrap();
        assert_eq!(resolved.username, "alice");
        assert_eq!(resolved.id, alice.account.id);
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

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source unavailable"))
        }
    }

    impl CryptoRng for ExhaustedRng {}

    fn exhausted_keygen(config: &ApiKeyConfig) -> api_key::Result<GeneratedKey> {
        generate_api_key_with_hash_from(&mut ExhaustedRng, config)
    }

    #[test]
    fn test_generation_failure_writes_nothing() {
        let (store, registrar) = setup(&["alice"]);
        let registrar = registrar.with_key_generator(exhausted_keygen);

        let err = registrar.register("alice", None).unwrap_err();
        assert!(matches!(err, RegistrationError::CredentialSourceUnavailable(_)));
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let stored = store.find_account_by_username("alice").unwrap().unwrap();
        assert!(stored.credential.is_none());
        assert!(!stored.is_registered);
        assert!(stored.registered_at.is_none());
    }

    #[test]
    fn test_failed_regeneration_keeps_old_key() {
        let (store, registrar) = setup(&["alice"]);
        let registration = registrar.register("alice", None).unwrap();

        let registrar = registrar.with_key_generator(exhausted_keygen);
        assert!(registrar.regenerate(&registration.account).is_err());

        let stored = store.get(registration.account.id).unwrap().unwrap();
        assert_eq!(stored.credential.as_ref(), Some(&registration.key.credential));
    }
}

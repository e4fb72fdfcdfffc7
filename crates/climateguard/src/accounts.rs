//! Accounts and the storage abstraction the authenticator scans.
//!
//! An account owns at most one credential (salted hash of its API key). The
//! raw key is never stored, so resolving a presented key means trying every
//! active, registered account's salt in turn.

use std::collections::BTreeMap;
use std::sync::RwLock;

use api_key::Credential;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

// ============================================================================
// Data Structs
// ============================================================================

/// A user account of the telemetry backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_registered: bool,
    /// Hash and salt of the current API key. `None` until registration.
    pub credential: Option<Credential>,
    pub created_at: Option<DateTime<Utc>>,
    pub registered_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// A pre-created, unregistered account.
    pub fn unregistered(id: i64, username: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email,
            is_active: false,
            is_registered: false,
            credential: None,
            created_at: Some(Utc::now()),
            registered_at: None,
            last_login: None,
        }
    }

    /// Whether this account may be considered when resolving an API key.
    pub fn is_candidate(&self) -> bool {
        self.is_active && self.is_registered && self.credential.is_some()
    }
}

// ============================================================================
// Account Source Trait
// ============================================================================

/// Persistence operations needed by authentication and registration.
///
/// Implementations must replace a credential's hash and salt atomically.
pub trait AccountSource: Send + Sync {
    /// All accounts that are active, registered and hold a credential.
    fn find_candidates(&self) -> Result<Vec<Account>, StoreError>;

    /// Record a successful authentication.
    fn record_login(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Look up an account by its username.
    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Replace the account's credential wholesale.
    fn update_credential(&self, account_id: i64, credential: &Credential)
    -> Result<(), StoreError>;

    /// Flip the account to active and registered.
    fn mark_registered(
        &self,
        account_id: i64,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Store the first credential and mark the account registered.
    ///
    /// Returns `false` if the account was already registered. Stores should
    /// override this with a single atomic write.
    fn complete_registration(
        &self,
        account_id: i64,
        credential: &Credential,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.update_credential(account_id, credential)?;
        self.mark_registered(account_id, email, at)?;
        Ok(true)
    }
}

// ============================================================================
// In-memory Store
// ============================================================================

/// Thread-safe in-memory account store.
///
/// Scans in ascending id order.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<BTreeMap<i64, Account>>,
}

impl MemoryAccountStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create an unregistered account and return it.
    pub fn create_account(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| StoreError::Poisoned)?;
        if accounts.values().any(|a| a.username == username) {
            return Err(StoreError::Duplicate(username.to_string()));
        }

        let id = accounts.keys().next_back().copied().unwrap_or(0) + 1;
        let account = Account::unregistered(id, username, email.map(str::to_string));
        accounts.insert(id, account.clone());
        Ok(account)
    }

    /// Insert or replace an account as-is.
    pub fn upsert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| StoreError::Poisoned)?;
        accounts.insert(account.id, account);
        Ok(())
    }

    /// Fetch an account by id.
    pub fn get(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
        Ok(accounts.get(&account_id).cloned())
    }

    fn with_account<T>(
        &self,
        account_id: i64,
        f: impl FnOnce(&mut Account) -> T,
    ) -> Result<T, StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| StoreError::Poisoned)?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound(account_id))?;
        Ok(f(account))
    }
}

impl AccountSource for MemoryAccountStore {
    fn find_candidates(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
        Ok(accounts
            .values()
            .filter(|a| a.is_candidate())
            .cloned()
            .collect())
    }

    fn record_login(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_account(account_id, |account| account.last_login = Some(at))
    }

    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
        Ok(accounts.values().find(|a| a.username == username).cloned())
    }

    fn update_credential(
        &self,
        account_id: i64,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        self.with_account(account_id, |account| {
            account.credential = Some(credential.clone())
        })
    }

    fn mark_registered(
        &self,
        account_id: i64,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_account(account_id, |account| {
            account.is_active = true;
            account.is_registered = true;
            account.registered_at = Some(at);
            if let Some(email) = email {
                account.email = Some(email.to_string());
            }
        })
    }

    fn complete_registration(
        &self,
        account_id: i64,
        credential: &Credential,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.with_account(account_id, |account| {
            if account.is_registered || account.credential.is_some() {
                return false;
            }
            account.credential = Some(credential.clone());
            account.is_active = true;
            account.is_registered = true;
            account.registered_at = Some(at);
            if let Some(email) = email {
                account.email = Some(email.to_string());
            }
            true
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(tag: &str) -> Credential {
        Credential::new(format!("hash-{tag}"), format!("salt-{tag}"))
    }

    #[test]
    fn test_create_account_assigns_increasing_ids() {
        let store = MemoryAccountStore::new();
        let alice = store.create_account("alice", None).unwrap();
        let bob = store.create_account("bob", Some("bob@example.com")).unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert!(!alice.is_registered);
        assert!(alice.credential.is_none());
        assert_eq!(bob.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_create_duplicate_username_rejected() {
        let store = MemoryAccountStore::new();
        store.create_account("alice", None).unwrap();
        assert!(matches!(
            store.create_account("alice", None),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_candidates_require_flags_and_credential() {
        let store = MemoryAccountStore::new();
        let registered = store.create_account("registered", None).unwrap();
        let inactive = store.create_account("inactive", None).unwrap();
        store.create_account("pending", None).unwrap();

        store
            .complete_registration(registered.id, &credential("a"), None, Utc::now())
            .unwrap();
        store
            .complete_registration(inactive.id, &credential("b"), None, Utc::now())
            .unwrap();
        let mut deactivated = store.get(inactive.id).unwrap().unwrap();
        deactivated.is_active = false;
        store.upsert_account(deactivated).unwrap();

        // Flags set but no credential
        let mut flagged = Account::unregistered(10, "flagged", None);
        flagged.is_active = true;
        flagged.is_registered = true;
        store.upsert_account(flagged).unwrap();

        let candidates = store.find_candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].username, "registered");
    }

    #[test]
    fn test_complete_registration_is_one_way() {
        let store = MemoryAccountStore::new();
        let alice = store.create_account("alice", None).unwrap();

        assert!(
            store
                .complete_registration(alice.id, &credential("1"), Some("a@x.io"), Utc::now())
                .unwrap()
        );
        assert!(
            !store
                .complete_registration(alice.id, &credential("2"), None, Utc::now())
                .unwrap()
        );

        let stored = store.get(alice.id).unwrap().unwrap();
        assert_eq!(stored.credential, Some(credential("1")));
        assert_eq!(stored.email.as_deref(), Some("a@x.io"));
        assert!(stored.is_active && stored.is_registered);
        assert!(stored.registered_at.is_some());
    }

    #[test]
    fn test_update_credential_replaces_pair() {
        let store = MemoryAccountStore::new();
        let alice = store.create_account("alice", None).unwrap();
        store
            .complete_registration(alice.id, &credential("old"), None, Utc::now())
            .unwrap();

        store.update_credential(alice.id, &credential("new")).unwrap();
        let stored = store.get(alice.id).unwrap().unwrap();
        assert_eq!(stored.credential, Some(credential("new")));
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let store = MemoryAccountStore::new();
        assert!(matches!(
            store.record_login(42, Utc::now()),
            Err(StoreError::NotFound(42))
        ));
        assert!(store.find_account_by_username("ghost").unwrap().is_none());
    }
}

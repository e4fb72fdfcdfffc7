//! SQLite-backed account store.
//!
//! Opens one connection per operation. Hash and salt live in the same row
//! and are always written by a single statement, guarded by a CHECK
//! constraint so a half-populated credential cannot be committed.

use std::path::Path;
use std::time::Duration;

use api_key::Credential;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::accounts::{Account, AccountSource};
use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT,
    api_key_hash TEXT,
    api_key_salt TEXT,
    is_active BOOLEAN NOT NULL DEFAULT 0,
    is_registered BOOLEAN NOT NULL DEFAULT 0,
    created_at TIMESTAMP,
    registered_at TIMESTAMP,
    last_login TIMESTAMP,
    CHECK ((api_key_hash IS NULL) = (api_key_salt IS NULL))
);
"#;

const ACCOUNT_COLUMNS: &str = "user_id, username, email, api_key_hash, api_key_salt, \
     is_active, is_registered, created_at, registered_at, last_login";

/// Account store persisted in a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteAccountStore {
    db_path: String,
}

impl SqliteAccountStore {
    /// Create a store for the given database path. Does not touch the file.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// Open the store and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let store = Self::new(db_path);
        store.initialize()?;
        Ok(store)
    }

    fn open_connection(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create the `Users` table if it does not exist.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Pre-create an unregistered account.
    pub fn create_account(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<Account, StoreError> {
        let conn = self.open_connection()?;
        let created_at = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO Users (username, email, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(username) DO NOTHING",
            params![username, email, created_at],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(username.to_string()));
        }

        let id = conn.last_insert_rowid();
        log::info!("Created account {} (id={})", username, id);
        self.fetch_account(&conn, id)?
            .ok_or(StoreError::NotFound(id))
    }

    /// All accounts ordered by id.
    pub fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM Users ORDER BY user_id"
        ))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Fetch a single account by id.
    pub fn get(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let conn = self.open_connection()?;
        self.fetch_account(&conn, account_id)
    }

    fn fetch_account(
        &self,
        conn: &Connection,
        account_id: i64,
    ) -> Result<Option<Account>, StoreError> {
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM Users WHERE user_id = ?1"),
                [account_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }
}

fn account_from_row(row: &Row<'_>) -> Result<Account, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let key_hash: Option<String> = row.get(3)?;
    let salt: Option<String> = row.get(4)?;

    let has_any = key_hash.is_some() || salt.is_some();
    let credential = Credential::from_parts(key_hash, salt);
    if has_any && credential.is_none() {
        log::warn!("Account id={} has a partial credential; ignoring it", id);
    }

    Ok(Account {
        id,
        username: row.get(1)?,
        email: row.get(2)?,
        credential,
        is_active: row.get(5)?,
        is_registered: row.get(6)?,
        created_at: row.get(7)?,
        registered_at: row.get(8)?,
        last_login: row.get(9)?,
    })
}

impl AccountSource for SqliteAccountStore {
    fn find_candidates(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM Users \
             WHERE api_key_hash IS NOT NULL AND api_key_salt IS NOT NULL \
             AND is_active = 1 AND is_registered = 1 \
             ORDER BY user_id"
        ))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn record_login(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        let updated = conn.execute(
            "UPDATE Users SET last_login = ?1 WHERE user_id = ?2",
            params![at, account_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(account_id));
        }
        Ok(())
    }

    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.open_connection()?;
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM Users WHERE username = ?1"),
                [username],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn update_credential(
        &self,
        account_id: i64,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        let updated = conn.execute(
            "UPDATE Users SET api_key_hash = ?1, api_key_salt = ?2 WHERE user_id = ?3",
            params![credential.key_hash, credential.salt, account_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(account_id));
        }
        Ok(())
    }

    fn mark_registered(
        &self,
        account_id: i64,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        let updated = conn.execute(
            "UPDATE Users SET is_active = 1, is_registered = 1, registered_at = ?1, \
             email = COALESCE(?2, email) WHERE user_id = ?3",
            params![at, email, account_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(account_id));
        }
        Ok(())
    }

    fn complete_registration(
        &self,
        account_id: i64,
        credential: &Credential,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.open_connection()?;
        let updated = conn.execute(
            "UPDATE Users SET api_key_hash = ?1, api_key_salt = ?2, is_active = 1, \
             is_registered = 1, registered_at = ?3, email = COALESCE(?4, email) \
             WHERE user_id = ?5 AND is_registered = 0 AND api_key_hash IS NULL",
            params![credential.key_hash, credential.salt, at, email, account_id],
        )?;
        Ok(updated == 1)
    }
}

// ============================================================================
// Tests
// ============================================================================

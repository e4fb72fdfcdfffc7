//! API-key authentication gateway for the climate telemetry backend.
//!
//! Accounts are pre-created by an administrator and registered by their
//! owners, who receive a single API key. The [`gateway`] resolves every
//! request's key to an account and forwards it upstream with the caller's
//! identity attached.

pub mod accounts;
pub mod auth;
pub mod configuration;
pub mod error;
pub mod gateway;
pub mod metric;
pub mod registration;
pub mod server;
pub mod store;

pub use accounts::{Account, AccountSource, MemoryAccountStore};
pub use auth::{Authenticator, PresentedCredentials, ensure_active};
pub use error::{AuthError, AuthFailure, RegistrationError, StoreError};
pub use registration::{Registrar, Registration};
pub use store::SqliteAccountStore;

//! Account credential storage.
//!
//! Provides:
//! - Account creation with username/password (PBKDF2-SHA256 + per-account random salt)
//! - Constant-time password verification that never distinguishes unknown users
//! - Password update (always rehashed under a fresh salt) and permanent deletion
//! - SQLite-backed persistent storage with a unique, case-insensitive username index
//!
//! ## Design Decisions
//! - Username uniqueness is enforced by the database, not by a check-then-insert.
//! - Hashes are stored as PHC strings so the salt and work factor travel with them.
//! - Hashing runs outside the connection lock; only single statements hold it.

pub mod error;
pub mod password;
pub mod store;

pub use error::AuthError;
pub use password::PasswordHasher;
pub use store::{Account, CredentialStore, DatabaseLocation};

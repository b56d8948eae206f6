//! SQLite-backed credential store.
//!
//! Tables:
//! - `accounts`: id, username (unique, case-insensitive), password_hash, created_at, updated_at

use super::error::{AuthError, Result};
use super::password::PasswordHasher;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum username length in characters.
pub const MAX_USERNAME_CHARS: usize = 64;

/// Maximum password length in bytes; bounds the cost of a single hash.
pub const MAX_PASSWORD_BYTES: usize = 1024;

/// A stored account.
///
/// `password_hash` is never serialized and is redacted from `Debug`.
#[derive(Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub(crate) password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Where the account table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse a connection string: `sqlite::memory:`, `:memory:`,
    /// `sqlite://<path>`, `sqlite:<path>`, or a bare path.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AuthError::validation("Database URL cannot be empty"));
        }
        if matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
            return Ok(Self::Memory);
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path.is_empty() {
            return Err(AuthError::validation(format!(
                "Database URL '{url}' has no path"
            )));
        }
        if url.contains("://") && !url.starts_with("sqlite://") {
            return Err(AuthError::validation(format!(
                "Unsupported database URL scheme in '{url}' (expected sqlite://)"
            )));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The single source of truth for account credentials.
///
/// One connection behind a mutex; every operation holds it for exactly one
/// statement. Hashing and verification always happen outside the lock.
#[derive(Debug)]
pub struct CredentialStore {
    conn: Mutex<Connection>,
    hasher: PasswordHasher,
    location: DatabaseLocation,
}

impl CredentialStore {
    /// Open (or create) the store named by a connection string.
    pub fn open(database_url: &str, hasher: PasswordHasher) -> Result<Self> {
        match DatabaseLocation::parse(database_url)? {
            DatabaseLocation::Memory => Self::in_memory(hasher),
            DatabaseLocation::File(path) => Self::open_path(&path, hasher),
        }
    }

    /// Open (or create) the store at a file path.
    pub fn open_path(db_path: &Path, hasher: PasswordHasher) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::init(conn, hasher, DatabaseLocation::File(db_path.to_path_buf()))
    }

    /// A private, non-persistent store.
    pub fn in_memory(hasher: PasswordHasher) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, hasher, DatabaseLocation::Memory)
    }

    fn init(conn: Connection, hasher: PasswordHasher, location: DatabaseLocation) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            hasher,
            location,
        })
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Create an account. Uniqueness is enforced by the table's unique index.
    pub fn create(&self, username: &str, password: &str) -> Result<Account> {
        let username = validate_username(username)?;
        validate_password(password)?;

        let password_hash = self.hasher.hash(password)?;
        let now = epoch_secs();
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO accounts (id, username, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account.id,
                account.username,
                account.password_hash,
                account.created_at,
                account.updated_at,
            ],
        );

        match result {
            Ok(_) => Ok(account),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AuthError::DuplicateUsername(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check a username/password pair.
    ///
    /// An unknown username and a wrong password both yield `Ok(false)`.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let stored = self.stored_hash(username.trim())?;

        Ok(match stored {
            Some(hash) => self.hasher.verify(password, &hash),
            None => {
                // Same work as a real check so timing does not reveal the miss
                self.hasher.dummy_verify(password)
            }
        })
    }

    /// Replace an account's password with a freshly salted hash.
    pub fn update(&self, username: &str, new_password: &str) -> Result<Account> {
        let username = username.trim();
        validate_password(new_password)?;

        let password_hash = self.hasher.hash(new_password)?;
        let now = epoch_secs();

        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE accounts SET password_hash = ?1, updated_at = ?2 WHERE username = ?3",
            params![password_hash, now, username],
        )?;
        if updated == 0 {
            return Err(AuthError::NotFound);
        }

        find_account(&conn, username)?.ok_or(AuthError::NotFound)
    }

    /// Permanently remove an account.
    pub fn delete(&self, username: &str) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM accounts WHERE username = ?1",
            params![username.trim()],
        )?;
        if deleted == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    /// All accounts, oldest first. Diagnostic use only.
    pub fn list(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, created_at, updated_at
             FROM accounts ORDER BY created_at ASC, rowid ASC",
        )?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    /// Look up one account by username.
    pub fn find(&self, username: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock();
        find_account(&conn, username.trim())
    }

    /// Count stored accounts.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn stored_hash(&self, username: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT password_hash FROM accounts WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }
}

fn find_account(conn: &Connection, username: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, username, password_hash, created_at, updated_at
             FROM accounts WHERE username = ?1",
            params![username],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn validate_username(username: &str) -> Result<&str> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(AuthError::validation("Username cannot be empty"));
    }
    if trimmed.chars().count() > MAX_USERNAME_CHARS {
        return Err(AuthError::validation(format!(
            "Username too long (max {MAX_USERNAME_CHARS} characters)"
        )));
    }
    Ok(trimmed)
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AuthError::validation("Password cannot be empty"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::validation(format!(
            "Password too long (max {MAX_PASSWORD_BYTES} bytes)"
        )));
    }
    Ok(())
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Tests ───────────────────────────────────────────────────────────

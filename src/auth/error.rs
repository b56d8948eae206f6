//! Error taxonomy for the credential store.

use thiserror::Error;

/// Every way a credential-store operation can fail.
///
/// `InvalidCredentials` deliberately covers both "no such user" and
/// "wrong password"; callers must not be able to tell them apart.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("User not found")]
    NotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The request was dropped (usually by the timeout layer) before its
    /// write started, so the write was skipped.
    #[error("Request abandoned before completion")]
    Abandoned,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures the caller could not have caused or fixed.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Hashing(_) | Self::Task(_)
        )
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

//! FitTrack account service: a credential store behind a small REST API.

pub mod auth;
pub mod config;
pub mod gateway;

pub use auth::{Account, AuthError, CredentialStore, PasswordHasher};
pub use config::Config;

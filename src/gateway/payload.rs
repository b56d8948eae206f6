//! Request bodies accepted by the gateway.
//!
//! Every field is optional at the JSON level so a missing field produces a
//! precise validation message instead of a generic deserialization error.
//! None of these types implement `Debug`; they carry plaintext passwords.

use crate::auth::AuthError;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;

/// Unwrap an extracted JSON body, turning shape errors into validation errors.
pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    body.map(|Json(b)| b)
        .map_err(|e| AuthError::validation(format!("Invalid request: {}", e.body_text())))
}

fn required(field: Option<String>, name: &str) -> Result<String, AuthError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AuthError::validation(format!("{name} is required"))),
    }
}

/// A validated username/password pair.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Body of `POST /users` and `POST /login`.
#[derive(Deserialize)]
pub struct CredentialsBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl CredentialsBody {
    pub fn validate(self) -> Result<Credentials, AuthError> {
        Ok(Credentials {
            username: required(self.username, "username")?,
            password: required(self.password, "password")?,
        })
    }
}

/// Validated password change.
pub struct PasswordChange {
    pub username: String,
    pub new_password: String,
    pub current_password: String,
}

/// Body of `PUT /update/users`.
///
/// `password` is the new password; `current_password` proves ownership.
#[derive(Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

impl UpdateBody {
    pub fn validate(self) -> Result<PasswordChange, AuthError> {
        Ok(PasswordChange {
            username: required(self.username, "username")?,
            new_password: required(self.password, "password")?,
            current_password: required(self.current_password, "current_password")?,
        })
    }
}

/// Body of `DELETE /delete/users`. `password` proves ownership.
#[derive(Deserialize)]
pub struct DeleteBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DeleteBody {
    pub fn validate(self) -> Result<Credentials, AuthError> {
        Ok(Credentials {
            username: required(self.username, "username")?,
            password: required(self.password, "password")?,
        })
    }
}

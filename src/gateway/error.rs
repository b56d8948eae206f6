//! Mapping from store errors to HTTP responses. Handlers never pick status
//! codes for failures themselves.

use crate::auth::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Body sent for any internal failure; details stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DuplicateUsername(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Abandoned => StatusCode::REQUEST_TIMEOUT,
            Self::StorageUnavailable(_) | Self::Hashing(_) | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_internal() {
            tracing::error!("Request failed: {self}");
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {self}");
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

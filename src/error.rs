//! Error types for Ballon d'Or
//!
//! All errors that reach a caller are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Transport failures never show up here: the data layer recovers
//! from them by serving the local cache.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote backend was reachable and refused the operation
    #[error("Remote rejected request (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The remote backend answered with a body we could not understand (502)
    #[error("Unexpected remote response: {0}")]
    Decode(String),

    /// Local cache could not be read or written (500)
    #[error("Local storage error: {0}")]
    LocalStorage(String),

    /// SQLite error from the persistent local store (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization error (500)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Short label used for the `error_type` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation",
            AppError::RemoteRejected { .. } => "remote_rejected",
            AppError::Decode(_) => "decode",
            AppError::LocalStorage(_) => "local_storage",
            AppError::Database(_) => "database",
            AppError::Serialization(_) => "serialization",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Remote rejections keep the remote's 4xx status so the browser
    /// can show the message as-is; everything else maps to a fixed code.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::RemoteRejected { status, message } => (
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|code| code.is_client_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                message.clone(),
            ),
            AppError::Decode(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::LocalStorage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Local storage error".to_string(),
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Serialization error".to_string(),
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

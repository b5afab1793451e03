//! services/api/src/error.rs
//!
//! Defines the error types for the API service: `ApiError` for startup and
//! `HttpError` for request handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use study_notes_core::{CatalogError, PortError};

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Errors returned by HTTP handlers, rendered as `{ "error": { "code", "message" } }`.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The request was understood but refused, e.g. a duplicate sign-up.
    #[error("{0}")]
    Rejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Remote service error: {0}")]
    Remote(String),
}

impl HttpError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            HttpError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            HttpError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            HttpError::Rejected(_) => (StatusCode::BAD_REQUEST, "REJECTED"),
            HttpError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            HttpError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            HttpError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            HttpError::Remote(_) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR"),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            HttpError::Remote(msg) => {
                tracing::error!("Remote service error: {msg}");
                "A storage or database error occurred".to_string()
            }
            HttpError::NotFound(msg)
            | HttpError::Validation(msg)
            | HttpError::Rejected(msg)
            | HttpError::Unauthorized(msg)
            | HttpError::Forbidden(msg) => msg.clone(),
            HttpError::PayloadTooLarge(_) => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(msg) => HttpError::NotFound(msg),
            PortError::Rejected(msg) => HttpError::Rejected(msg),
            PortError::Unauthorized => HttpError::Unauthorized("Authentication required".to_string()),
            PortError::Unexpected(msg) => HttpError::Remote(msg),
        }
    }
}

impl From<CatalogError> for HttpError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Validation(v) => HttpError::Validation(v.to_string()),
            CatalogError::Unauthorized(reason) => HttpError::Forbidden(reason.to_string()),
            CatalogError::Remote(port) => port.into(),
            CatalogError::CategoryUnavailable(c) => {
                HttpError::Validation(format!("The {c} category is not available"))
            }
            CatalogError::UnknownNote(id) => HttpError::NotFound(format!("Note {id} not found")),
        }
    }
}

//! Error handling for the orchestrator core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Music-service auth expired (401 / invalid_grant)
    #[error("Auth expired: {0}")]
    AuthExpired(String),

    /// Rate limited; `retry_after` carries the server hint in seconds
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// Transient failure (network, 5xx, timeout)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error (invariant violation, unexpected state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable kind tag, surfaced at the invocation boundary
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Conflict(_) => "CONFLICT",
            Error::AuthExpired(_) => "AUTH_EXPIRED",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Transient(_) => "TRANSIENT",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a bounded retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) | Error::RateLimited { .. } => true,
            // reqwest timeouts and connection drops surface here
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::AuthExpired(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Error::RateLimited { message, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, message.clone())
            }
            Error::Transient(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Error::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Serialization(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        // Structured extras, when a variant carries any
        let details = match &self {
            Error::RateLimited {
                retry_after: Some(secs),
                ..
            } => Some(json!({ "retryAfterSeconds": secs })),
            _ => None,
        };

        tracing::error!(
            status = %status,
            kind = %kind,
            message = %message,
            "Request error"
        );

        let mut body = json!({
            "kind": kind,
            "message": message
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

//! Application error types for the Cadence backend.
//!
//! Provides a unified error type that implements `IntoResponse` for Axum.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// When set, internal error details are included in response bodies.
static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Toggle whether 5xx responses carry the underlying error message.
///
/// Enabled outside production so clients can see what went wrong.
pub fn set_expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL_DETAILS.store(enabled, Ordering::Relaxed);
}

fn internal_detail(detail: impl FnOnce() -> String) -> Option<String> {
    if EXPOSE_INTERNAL_DETAILS.load(Ordering::Relaxed) {
        Some(detail())
    } else {
        None
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// SQLite-specific errors (for direct rusqlite usage)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration loading/parsing errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication required
    #[error("Unauthorized")]
    Unauthorized,

    /// Insufficient permissions
    #[error("Forbidden")]
    Forbidden,

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict (e.g., duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External catalog unavailable or misbehaving
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limited by the external catalog
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    internal_detail(|| e.to_string()),
                )
            }
            AppError::Sqlite(e) => {
                tracing::error!("SQLite error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    internal_detail(|| e.to_string()),
                )
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    internal_detail(|| e.to_string()),
                )
            }
            AppError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "not_found", Some(resource.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::BadRequest(msg) => {
                // Client-caused, safe to expose
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::ServiceUnavailable(service) => {
                tracing::warn!("Service unavailable: {}", service);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    Some(format!("{} is temporarily unavailable", service)),
                )
            }
            AppError::RateLimited(service) => {
                tracing::warn!("Rate limited by {}", service);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    Some(format!("{} rate limit exceeded, try again later", service)),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    internal_detail(|| msg.clone()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

/// Fallback handler for routes that do not exist.
pub async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route not found: {}", uri.path()))
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

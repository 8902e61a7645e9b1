//! Error types for the marketplace service.
//!
//! - [`ApiError`] bridges [`LedgerError`] and request validation failures to HTTP
//!   responses with a stable `{code, message}` JSON body.
//! - [`AppError`] covers startup failures of the server binary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use surplus_core::error::{ErrorKind, LedgerError, StoreError};
use thiserror::Error;

/// Error returned by HTTP handlers.
///
/// # Examples
///
/// ```
/// use axum::http::StatusCode;
/// use surplus_core::LedgerError;
/// use surplus_marketplace::error::ApiError;
///
/// let error = ApiError::from(LedgerError::InsufficientStock { requested: 3, remaining: 2 });
/// assert_eq!(error.status(), StatusCode::CONFLICT);
/// assert_eq!(error.code(), "INSUFFICIENT_STOCK");
/// ```
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Units still available, set on stock conflicts so the buyer can lower the request
    remaining: Option<u32>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl ApiError {
    /// Create a new API error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            remaining: None,
            source: None,
        }
    }

    /// Attach the error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED".to_string())
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN".to_string())
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            ErrorKind::Internal.code().to_string(),
        )
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// HTTP status for each ledger outcome.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotOwner => StatusCode::FORBIDDEN,
        ErrorKind::InsufficientStock
        | ErrorKind::NotReservable
        | ErrorKind::PendingPickup
        | ErrorKind::AlreadyFinal
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::InvalidQuantity | ErrorKind::InvalidTimeWindow | ErrorKind::InvalidPrice => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        let kind = error.kind();
        let status = status_for(kind);
        let remaining = match &error {
            LedgerError::InsufficientStock { remaining, .. } => Some(*remaining),
            _ => None,
        };
        match error {
            LedgerError::Store(source) => {
                Self::internal("An internal error occurred").with_source(source.into())
            }
            other => {
                let mut api = Self::new(status, other.to_string(), kind.code().to_string());
                api.remaining = remaining;
                api
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        LedgerError::from(error).into()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Units still available, for stock conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(status = %self.status, code = %self.code, "Internal server error");
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            remaining: self.remaining,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `ApiError`.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Failures while starting the server.
#[derive(Error, Debug)]
pub enum AppError {
    /// Could not connect to the database.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[source] StoreError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binding or serving failed.
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

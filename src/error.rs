//! Pipeline error types with HTTP status code mapping.
//!
//! [`PipelineError`] is the central error type shared by the crawl
//! orchestrator, the change detector and the notification matcher. Each
//! variant maps to a numeric code and HTTP status so the API layer can
//! surface it without further translation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "validation failed: product id `abc` is not numeric"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure reported by a [`crate::service::ProductSource`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The upstream site could not be reached or answered with an error.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered but the payload could not be interpreted.
    #[error("malformed listing: {0}")]
    Malformed(String),
}

/// Error enum shared by every pipeline stage.
///
/// # Error Code Ranges
///
/// | Range     | Category      | HTTP Status                  |
/// |-----------|---------------|------------------------------|
/// | 1000–1999 | Validation    | 400 Bad Request              |
/// | 2000–2999 | Not Found     | 404 Not Found                |
/// | 3000–3999 | Server / I/O  | 500 / 502 / 503 / 504        |
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or non-numeric identifier, or an out-of-range value.
    /// Nothing has been written when this is returned.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown category, product, variant or notification.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. `"product"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Storage or transport failure. Aborts the current unit of work only.
    #[error("transient i/o failure: {0}")]
    TransientIo(String),

    /// The product source failed to deliver a listing.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A call exceeded its deadline.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// Deadline in milliseconds.
        after_ms: u64,
    },

    /// Internal error (encoding failures, broken invariants).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::NotFound { .. } => 2001,
            Self::Internal(_) => 3000,
            Self::TransientIo(_) => 3001,
            Self::Fetch(_) => 3002,
            Self::Timeout { .. } => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::TransientIo(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PipelineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::TransientIo(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

//! Application error model with MCP and HTTP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for operation-level
//! failures, and maps each variant to the appropriate MCP `ErrorData` and HTTP
//! status. Per-call upstream failures inside a fan-out are NOT represented here;
//! see [`crate::graph::UpstreamError`], which is folded into delivery outcomes.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers every failure that aborts a whole operation before (or instead of)
/// reporting per-recipient outcomes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (missing field, malformed request, bad config value)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// No usable bearer token, or the device-code flow was refused
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation timeout (device-code expiry, upstream wait)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Identity or mail provider answered with an unusable response
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `AuthFailed` → `invalid_request`
    /// - `Timeout` → `internal_error`
    /// - `Upstream` → `internal_error`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::AuthFailed(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "auth_failed" })))
            }
            Self::Timeout(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "timeout" })))
            }
            Self::Upstream(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "upstream" })))
            }
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }

    /// HTTP status used by the REST front end
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "status": "error", "message": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

//! Error types for renewviz.
//!
//! A single `thiserror` enum covers the upstream API taxonomy (authentication,
//! rate limiting, missing data, failed requests), client input problems
//! (bad geometry, bad query parameters) and the local failure modes of
//! parsing and export.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Custom error type for renewviz operations.
///
/// # Rust Concepts
/// - `#[derive(Error)]` from `thiserror` auto-implements `std::error::Error`
/// - `#[from]` implements `From<T>` so `?` converts parse and frame errors
#[derive(Debug, Error)]
pub enum RenewVizError {
    /// Upstream rejected the API key (HTTP 401). Never retried.
    #[error("authentication failed: the EIA API key was rejected")]
    AuthenticationFailure,

    /// Upstream kept answering HTTP 429 until retries ran out.
    #[error("EIA API rate limit exceeded")]
    RateLimited,

    /// Upstream answered HTTP 404 for the given URL.
    #[error("data not found: {0}")]
    NotFound(String),

    /// Any other HTTP error status, or transport failures after the last retry.
    #[error("request failed: {message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    /// Transient transport failure (timeout, connection reset, DNS).
    /// The retry policy turns this into `RequestFailed` once attempts run out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Polygon coordinates that are not a JSON array of `[lat, lon]` pairs.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Query parameters that cannot be interpreted.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Successful status but the body is not the expected shape.
    #[error("invalid API response: {0}")]
    InvalidApiResponse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// DataFrame construction or serialization failed.
    #[error("frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RenewVizError {
    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RenewVizError::AuthenticationFailure => "UPSTREAM_AUTH_FAILED",
            RenewVizError::RateLimited => "UPSTREAM_RATE_LIMITED",
            RenewVizError::NotFound(_) => "NOT_FOUND",
            RenewVizError::RequestFailed { .. } | RenewVizError::Transport(_) => {
                "UPSTREAM_REQUEST_FAILED"
            }
            RenewVizError::InvalidGeometry(_) => "INVALID_GEOMETRY",
            RenewVizError::BadRequest(_) => "BAD_REQUEST",
            RenewVizError::InvalidApiResponse(_) | RenewVizError::JsonParse(_) => {
                "INVALID_UPSTREAM_RESPONSE"
            }
            RenewVizError::Frame(_) => "EXPORT_FAILED",
            RenewVizError::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RenewVizError::InvalidGeometry(_) | RenewVizError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            RenewVizError::NotFound(_) => StatusCode::NOT_FOUND,
            RenewVizError::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
            RenewVizError::RequestFailed { .. }
            | RenewVizError::Transport(_)
            | RenewVizError::InvalidApiResponse(_)
            | RenewVizError::JsonParse(_) => StatusCode::BAD_GATEWAY,
            // A rejected key is our misconfiguration, not the caller's.
            RenewVizError::AuthenticationFailure
            | RenewVizError::Frame(_)
            | RenewVizError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for failed requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for RenewVizError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_message() {
        let err = RenewVizError::RequestFailed {
            status: Some(400),
            message: "HTTP 400: bad facet".into(),
        };
        assert_eq!(err.to_string(), "request failed: HTTP 400: bad facet");

        let err = RenewVizError::RequestFailed {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "request failed: connection reset");
    }

    #[test]
    fn test_client_errors_map_to_bad_request() {
        assert_eq!(
            RenewVizError::InvalidGeometry("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RenewVizError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_upstream_errors_map_to_gateway_statuses() {
        assert_eq!(
            RenewVizError::RateLimited.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RenewVizError::Transport("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RenewVizError::AuthenticationFailure.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

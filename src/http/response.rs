//! Response classification.
//!
//! # Responsibilities
//! - Map non-success status codes to `ApiFailure`
//! - Separate timeouts and refused connections from other transport errors
//! - Decode JSON payloads, reporting malformed bodies as `ApiFailure::Payload`

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why an API call did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiFailure {
    #[error("unauthorized (401)")]
    Unauthorized,

    #[error("forbidden (403)")]
    Forbidden,

    #[error("bad request (400)")]
    BadRequest,

    /// Per-attempt timeout or a refused connection.
    #[error("request timed out or connection refused: {0}")]
    Timeout(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid payload: {0}")]
    Payload(String),
}

impl ApiFailure {
    /// Classify a non-success status code.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiFailure::Unauthorized,
            StatusCode::FORBIDDEN => ApiFailure::Forbidden,
            StatusCode::BAD_REQUEST => ApiFailure::BadRequest,
            other => ApiFailure::Status(other.as_u16()),
        }
    }

    /// Label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiFailure::Unauthorized => "unauthorized",
            ApiFailure::Forbidden => "forbidden",
            ApiFailure::BadRequest => "bad_request",
            ApiFailure::Timeout(_) => "timeout",
            ApiFailure::Status(_) => "status",
            ApiFailure::Transport(_) => "transport",
            ApiFailure::Payload(_) => "payload",
        }
    }
}

impl From<reqwest::Error> for ApiFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ApiFailure::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiFailure::Payload(e.to_string())
        } else {
            ApiFailure::Transport(e.to_string())
        }
    }
}

/// Decode a JSON payload.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiFailure> {
    serde_json::from_str(body).map_err(|e| ApiFailure::Payload(e.to_string()))
}

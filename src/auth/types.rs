//! Token types and the auth error taxonomy.

use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::ApiFailure;
use crate::resilience::Classify;

/// Why a token could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum AuthError {
    /// The client id/secret pair was rejected (401).
    #[error("invalid client credentials")]
    InvalidCredentials,

    /// The requested scopes are not granted to the client (403).
    #[error("invalid scopes")]
    InvalidScopes,

    /// The identity service did not answer in time, or refused the connection.
    #[error("token request timed out")]
    Timeout,

    #[error("unknown token error")]
    Unknown,
}

impl Classify for AuthError {
    fn is_transient(&self) -> bool {
        matches!(self, AuthError::Timeout | AuthError::Unknown)
    }

    fn timed_out() -> Self {
        AuthError::Timeout
    }
}

impl From<ApiFailure> for AuthError {
    fn from(failure: ApiFailure) -> Self {
        match failure {
            ApiFailure::Unauthorized => AuthError::InvalidCredentials,
            ApiFailure::Forbidden => AuthError::InvalidScopes,
            ApiFailure::Timeout(_) => AuthError::Timeout,
            ApiFailure::BadRequest
            | ApiFailure::Status(_)
            | ApiFailure::Transport(_)
            | ApiFailure::Payload(_) => AuthError::Unknown,
        }
    }
}

/// Client-credentials grant body.
#[derive(Clone, Serialize)]
pub(crate) struct TokenGrant {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenGrant {
    pub fn client_credentials(client_id: &str, client_secret: &str, audience: &str, scopes: &[String]) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            audience: audience.to_string(),
            grant_type: "client_credentials",
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("grant_type", &self.grant_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// A bearer token with its absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl AccessToken {
    pub(crate) fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: response.access_token,
            expires_at: issued_at + ChronoDuration::seconds(response.expires_in.max(0)),
            scope: response.scope.unwrap_or_default(),
            token_type: response.token_type,
        }
    }

    /// Instant after which the token is no longer handed out.
    pub fn refresh_at(&self, leeway: ChronoDuration) -> DateTime<Utc> {
        self.expires_at - leeway
    }

    /// Usable only while `now < expires_at - leeway`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway: ChronoDuration) -> bool {
        now < self.refresh_at(leeway)
    }
}

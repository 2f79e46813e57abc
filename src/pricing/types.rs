//! Pricing request/result types and the pricing error taxonomy.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::http::ApiFailure;
use crate::resilience::{Classify, Resolved};

/// Largest batch accepted by the batch endpoints.
pub const MAX_REQUEST_SIZE: usize = 500;

/// Why a pricing call did not produce optimized data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum SpressoError {
    /// Token acquisition failed, or the pricing service rejected the token (401/403).
    #[error("authentication failed")]
    AuthError,

    /// The request was rejected (400) or exceeded the batch size.
    #[error("bad request")]
    BadRequest,

    /// Deadline passed, the caller cancelled, or the connection was refused.
    #[error("request timed out")]
    Timeout,

    #[error("unknown pricing error")]
    Unknown,
}

impl Classify for SpressoError {
    fn is_transient(&self) -> bool {
        matches!(self, SpressoError::Timeout | SpressoError::Unknown)
    }

    fn timed_out() -> Self {
        SpressoError::Timeout
    }
}

impl From<AuthError> for SpressoError {
    fn from(_: AuthError) -> Self {
        SpressoError::AuthError
    }
}

impl From<ApiFailure> for SpressoError {
    fn from(failure: ApiFailure) -> Self {
        match failure {
            ApiFailure::Unauthorized | ApiFailure::Forbidden => SpressoError::AuthError,
            ApiFailure::BadRequest => SpressoError::BadRequest,
            ApiFailure::Timeout(_) => SpressoError::Timeout,
            ApiFailure::Status(_) | ApiFailure::Transport(_) | ApiFailure::Payload(_) => SpressoError::Unknown,
        }
    }
}

/// What pricing operations return: data that is always usable plus the error that
/// degraded it, or the bare error when `throw_on_failure` is set.
pub type PriceOutcome<T> = Result<Resolved<T, SpressoError>, SpressoError>;

/// One (device, item) price lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequest {
    pub device_id: String,
    pub item_id: String,
    pub default_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub override_to_default_price: bool,
    /// Used for override matching only, never sent.
    #[serde(default, skip_serializing)]
    pub user_agent: Option<String>,
}

impl PriceRequest {
    pub fn new(device_id: impl Into<String>, item_id: impl Into<String>, default_price: f64) -> Self {
        Self {
            device_id: device_id.into(),
            item_id: item_id.into(),
            default_price,
            user_id: None,
            override_to_default_price: false,
            user_agent: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn override_to_default_price(mut self, enabled: bool) -> Self {
        self.override_to_default_price = enabled;
        self
    }
}

/// Price for one item, optimized by the service or synthesized from the default price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceOptimizationResult {
    pub item_id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub price: f64,
    #[serde(rename = "isPriceOptimized", default)]
    pub is_optimized: bool,
}

impl PriceOptimizationResult {
    /// Default-priced, unoptimized result for a request.
    pub fn fallback(request: &PriceRequest) -> Self {
        Self {
            item_id: request.item_id.clone(),
            device_id: request.device_id.clone(),
            user_id: request.user_id.clone(),
            price: request.default_price,
            is_optimized: false,
        }
    }
}

/// Default-priced results for a whole batch, in request order.
pub fn fallback_batch(requests: &[PriceRequest]) -> Vec<PriceOptimizationResult> {
    requests.iter().map(PriceOptimizationResult::fallback).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeOrName {
    Code(u8),
    Name(String),
}

/// Accept an enum encoded as its numeric code or its name.
pub(crate) fn code_or_name<'de, D, T>(deserializer: D, variants: &[(u8, &str, T)]) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Copy,
{
    let repr = CodeOrName::deserialize(deserializer)?;
    let found = variants.iter().find(|(code, name, _)| match &repr {
        CodeOrName::Code(c) => c == code,
        CodeOrName::Name(n) => n.eq_ignore_ascii_case(name),
    });
    found.map(|(_, _, value)| *value).ok_or_else(|| {
        let shown = match repr {
            CodeOrName::Code(c) => c.to_string(),
            CodeOrName::Name(n) => n,
        };
        serde::de::Error::custom(format!("unknown status '{}'", shown))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = PriceRequest::new("dev", "1111", 9.99)
            .with_user_agent("Googlebot")
            .override_to_default_price(true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["deviceId"], "dev");
        assert_eq!(json["itemId"], "1111");
        assert_eq!(json["overrideToDefaultPrice"], true);
        assert!(json.get("userAgent").is_none());
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_result_wire_format() {
        let result: PriceOptimizationResult = serde_json::from_str(
            r#"{"itemId":"1","deviceId":"d","price":8.5,"isPriceOptimized":true,"userId":null}"#,
        )
        .unwrap();
        assert!(result.is_optimized);
        assert_eq!(result.user_id, None);
    }

    #[test]
    fn test_fallback_is_never_optimized() {
        let request = PriceRequest::new("dev", "1", 4.25).with_user_id("u");
        let result = PriceOptimizationResult::fallback(&request);
        assert_eq!(result.price, 4.25);
        assert!(!result.is_optimized);
        assert_eq!(result.user_id.as_deref(), Some("u"));
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(SpressoError::from(ApiFailure::Forbidden), SpressoError::AuthError);
        assert_eq!(SpressoError::from(ApiFailure::BadRequest), SpressoError::BadRequest);
        assert_eq!(SpressoError::from(ApiFailure::Status(502)), SpressoError::Unknown);
        assert_eq!(SpressoError::from(AuthError::Timeout), SpressoError::AuthError);
        assert!(!SpressoError::AuthError.is_transient());
        assert!(SpressoError::Timeout.is_transient());
    }
}

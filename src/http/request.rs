//! Outbound request description.
//!
//! # Responsibilities
//! - Describe one API call independently of the base URL it is sent to
//! - Carry the bearer token and the caller's forwarded metadata
//! - Serialize JSON bodies up front so a retry re-sends identical bytes

use std::fmt;

use reqwest::Method;
use serde::Serialize;

use crate::http::ApiFailure;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header forwarding the end user's IP address.
pub const X_REAL_IP: &str = "x-real-ip";

/// Header forwarding the end user's cookie.
pub const X_REAL_COOKIE: &str = "x-real-cookie";

/// Information about the end user's request, forwarded to the pricing service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub original_ip: Option<String>,
    pub cookie: Option<String>,
}

impl RequestMetadata {
    /// Header pairs to attach. Blank values are skipped.
    pub fn headers(&self) -> Vec<(&'static str, &str)> {
        let mut headers = Vec::new();
        if let Some(ip) = self.original_ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
            headers.push((X_REAL_IP, ip));
        }
        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            headers.push((X_REAL_COOKIE, cookie));
        }
        headers
    }
}

/// One API call.
#[derive(Clone)]
pub struct ApiRequest {
    pub(crate) operation: &'static str,
    pub(crate) method: Method,
    pub(crate) path: &'static str,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<String>,
    pub(crate) bearer: Option<String>,
    pub(crate) metadata: Option<RequestMetadata>,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("operation", &self.operation)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(String::len))
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("original_ip", &self.metadata.as_ref().and_then(|m| m.original_ip.as_deref()))
            .finish()
    }
}

impl ApiRequest {
    fn new(operation: &'static str, method: Method, path: &'static str) -> Self {
        Self {
            operation,
            method,
            path,
            query: Vec::new(),
            body: None,
            bearer: None,
            metadata: None,
        }
    }

    pub fn get(operation: &'static str, path: &'static str) -> Self {
        Self::new(operation, Method::GET, path)
    }

    pub fn post<B: Serialize>(operation: &'static str, path: &'static str, body: &B) -> Result<Self, ApiFailure> {
        Self::new(operation, Method::POST, path).json(body)
    }

    pub fn put<B: Serialize>(operation: &'static str, path: &'static str, body: &B) -> Result<Self, ApiFailure> {
        Self::new(operation, Method::PUT, path).json(body)
    }

    fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiFailure> {
        let encoded = serde_json::to_string(body).map_err(|e| ApiFailure::Payload(e.to_string()))?;
        self.body = Some(encoded);
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn metadata(mut self, metadata: Option<&RequestMetadata>) -> Self {
        self.metadata = metadata.cloned();
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

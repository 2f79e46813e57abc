//! API client for one remote service.

use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::http::response::{self, ApiFailure};
use crate::http::request::{ApiRequest, X_REQUEST_ID};
use crate::observability::metrics;

/// Errors building a client from configuration.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sends `ApiRequest`s to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    extra_query: Vec<(String, String)>,
}

impl ApiClient {
    /// `additional_parameters` is a raw query string appended to every request.
    pub fn new(base_url: &str, additional_parameters: &str, http_timeout: Duration) -> Result<Self, ClientBuildError> {
        Url::parse(base_url).map_err(|source| ClientBuildError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;

        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .connect_timeout(http_timeout)
            .build()?;

        let extra_query = url::form_urlencoded::parse(additional_parameters.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            extra_query,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiFailure> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        if !request.query.is_empty() || !self.extra_query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().chain(self.extra_query.iter()));
        }
        Ok(url)
    }

    /// Send a request and return the raw body of a 2xx response.
    pub async fn send_raw(&self, request: ApiRequest) -> Result<String, ApiFailure> {
        let url = self.url_for(&request)?;
        let request_id = Uuid::new_v4().to_string();
        let operation = request.operation;

        tracing::debug!(
            operation,
            request_id = %request_id,
            method = %request.method,
            path = request.path,
            "Sending API request"
        );

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(X_REQUEST_ID, &request_id);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(metadata) = &request.metadata {
            for (name, value) in metadata.headers() {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let started = Instant::now();
        let outcome = Self::dispatch(builder).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(_) => metrics::record_remote_call(operation, "success", elapsed),
            Err(failure) => {
                metrics::record_remote_call(operation, failure.kind(), elapsed);
                tracing::warn!(
                    operation,
                    request_id = %request_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %failure,
                    "API request failed"
                );
            }
        }
        outcome
    }

    async fn dispatch(builder: reqwest::RequestBuilder) -> Result<String, ApiFailure> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiFailure::from_status(status));
        }
        Ok(response.text().await?)
    }

    /// Send a request and decode the JSON body of a 2xx response.
    pub async fn send<T: serde::de::DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiFailure> {
        let body = self.send_raw(request).await?;
        response::decode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = ApiClient::new("not a url", "", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_url_includes_request_and_debug_parameters() {
        let client = ApiClient::new("http://localhost:8080/", "?status=500&delay=2", Duration::from_secs(1)).unwrap();
        let request = ApiRequest::get("test", "/pim/v1/prices").query("itemId", "1111");
        let url = client.url_for(&request).unwrap();
        assert_eq!(url.path(), "/pim/v1/prices");
        assert_eq!(url.query(), Some("itemId=1111&status=500&delay=2"));
    }

    #[test]
    fn test_url_without_parameters_has_no_query() {
        let client = ApiClient::new("http://localhost:8080", "", Duration::from_secs(1)).unwrap();
        let url = client.url_for(&ApiRequest::get("test", "/a")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/a");
    }
}

//! Token acquisition and caching.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::types::{AccessToken, AuthError, TokenGrant, TokenResponse};
use crate::cache::{Expiry, ResponseCache};
use crate::config::AuthConfig;
use crate::http::{ApiClient, ApiFailure, ApiRequest, ClientBuildError};
use crate::observability::metrics;
use crate::resilience::{CircuitState, Classify, ResilientExecutor};

/// Identity service token endpoint.
pub const TOKEN_PATH: &str = "/identity/v1/public/token";

/// Cached tokens are refreshed this long before they actually expire.
pub const TOKEN_LEEWAY_SECS: i64 = 5 * 60;

const TOKEN_CACHE_PREFIX: &str = "spresso.auth.token";

/// A failed token attempt. A 400 maps to `AuthError::Unknown` but is not worth retrying,
/// so transience is tracked next to the public error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TokenFailure {
    error: AuthError,
    transient: bool,
}

impl fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Classify for TokenFailure {
    fn is_transient(&self) -> bool {
        self.transient
    }

    fn timed_out() -> Self {
        AuthError::Timeout.into()
    }
}

impl From<AuthError> for TokenFailure {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            transient: error.is_transient(),
        }
    }
}

impl From<ApiFailure> for TokenFailure {
    fn from(failure: ApiFailure) -> Self {
        match failure {
            ApiFailure::BadRequest => {
                tracing::error!("Token request rejected as a bad request (400)");
                Self {
                    error: AuthError::Unknown,
                    transient: false,
                }
            }
            other => AuthError::from(other).into(),
        }
    }
}

/// Exchanges client credentials for bearer tokens and caches them per token group.
pub struct TokenProvider {
    api: ApiClient,
    cache: Arc<dyn ResponseCache>,
    executor: ResilientExecutor<TokenFailure>,
    grant: TokenGrant,
    cache_key: String,
    leeway: ChronoDuration,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("base_url", &self.api.base_url())
            .field("cache_key", &self.cache_key)
            .field("circuit", &self.executor.circuit_state())
            .finish()
    }
}

impl TokenProvider {
    pub fn new(config: &AuthConfig, cache: Arc<dyn ResponseCache>) -> Result<Self, ClientBuildError> {
        let api = ApiClient::new(
            &config.base_url,
            &config.additional_parameters,
            config.resiliency.http_timeout(),
        )?;

        Ok(Self {
            api,
            cache,
            executor: ResilientExecutor::from_config("token", &config.resiliency),
            grant: TokenGrant::client_credentials(
                &config.client_id,
                &config.client_secret,
                &config.audience,
                &config.scopes,
            ),
            cache_key: format!("{}.{}", TOKEN_CACHE_PREFIX, config.token_group),
            leeway: ChronoDuration::seconds(TOKEN_LEEWAY_SECS),
        })
    }

    /// Cache key holding this provider's token.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.executor.circuit_state()
    }

    /// Return a cached token, or fetch a fresh one through the resiliency policies.
    ///
    /// With `throw_on_failure` unset the error is still returned; there is no default token.
    pub async fn get_token(&self, cancel: &CancellationToken) -> Result<AccessToken, AuthError> {
        let outcome = match self.cached_token().await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => self.executor.execute(cancel, || self.request_token()).await,
            Err(failure) => Err(failure),
        };

        self.executor
            .recover(outcome.map(Some), |_| None)
            .map_err(|failure| failure.error)?
            .into_result()
            .map_err(|failure| failure.error)?
            .ok_or(AuthError::Unknown)
    }

    async fn cached_token(&self) -> Result<Option<AccessToken>, TokenFailure> {
        let cached = self.cache.get(&self.cache_key).await.map_err(|e| {
            tracing::error!(key = %self.cache_key, error = %e, "Token cache read failed");
            TokenFailure::from(AuthError::Unknown)
        })?;

        let Some(payload) = cached else {
            tracing::debug!(key = %self.cache_key, "Token cache miss");
            metrics::record_cache_lookup("token", false);
            return Ok(None);
        };

        let token: AccessToken = match serde_json::from_str(&payload) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(key = %self.cache_key, error = %e, "Discarding unreadable cached token");
                metrics::record_cache_lookup("token", false);
                return Ok(None);
            }
        };

        if !token.is_valid_at(Utc::now(), self.leeway) {
            tracing::debug!(key = %self.cache_key, "Cached token within leeway, fetching new token");
            metrics::record_cache_lookup("token", false);
            return Ok(None);
        }

        tracing::debug!(key = %self.cache_key, "Token cache hit");
        metrics::record_cache_lookup("token", true);
        Ok(Some(token))
    }

    async fn request_token(&self) -> Result<AccessToken, TokenFailure> {
        tracing::debug!(base_url = %self.api.base_url(), "Fetching token");
        let request = ApiRequest::post("token", TOKEN_PATH, &self.grant)?;
        let response: TokenResponse = self.api.send(request).await?;
        let token = AccessToken::from_response(response, Utc::now());

        match serde_json::to_string(&token) {
            Ok(payload) => {
                let expiry = Expiry::Absolute(token.refresh_at(self.leeway));
                if let Err(e) = self.cache.set(&self.cache_key, payload, expiry).await {
                    tracing::warn!(key = %self.cache_key, error = %e, "Token cache write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Token could not be serialized for caching"),
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::ResiliencyConfig;

    fn provider(cache: Arc<MemoryCache>) -> TokenProvider {
        let config = AuthConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_group: "tests".to_string(),
            resiliency: ResiliencyConfig {
                max_retries: 0,
                timeout_ms: 2_000,
                http_timeout_ms: 500,
                ..ResiliencyConfig::default()
            },
            ..AuthConfig::default()
        };
        TokenProvider::new(&config, cache).unwrap()
    }

    fn store(token: &AccessToken) -> String {
        serde_json::to_string(token).unwrap()
    }

    #[test]
    fn test_bad_request_is_not_transient() {
        let failure = TokenFailure::from(ApiFailure::BadRequest);
        assert_eq!(failure.error, AuthError::Unknown);
        assert!(!failure.is_transient());
        assert!(TokenFailure::from(ApiFailure::Status(503)).is_transient());
    }

    #[tokio::test]
    async fn test_cached_token_served_without_network() {
        let cache = Arc::new(MemoryCache::new());
        let provider = provider(cache.clone());
        assert_eq!(provider.cache_key(), "spresso.auth.token.tests");

        let token = AccessToken {
            value: "cached".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            scope: String::new(),
            token_type: None,
        };
        cache
            .set(provider.cache_key(), store(&token), Expiry::Relative(std::time::Duration::from_secs(60)))
            .await
            .unwrap();

        let got = provider.get_token(&CancellationToken::new()).await.unwrap();
        assert_eq!(got, token);
    }

    #[tokio::test]
    async fn test_token_inside_leeway_is_refetched() {
        let cache = Arc::new(MemoryCache::new());
        let provider = provider(cache.clone());

        let stale = AccessToken {
            value: "stale".to_string(),
            expires_at: Utc::now() + ChronoDuration::minutes(2),
            scope: String::new(),
            token_type: None,
        };
        cache
            .set(provider.cache_key(), store(&stale), Expiry::Relative(std::time::Duration::from_secs(60)))
            .await
            .unwrap();

        // Nothing listens on the discard port, so the refetch fails.
        let err = provider.get_token(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout | AuthError::Unknown));
    }
}

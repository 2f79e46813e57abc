//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base URL for both the identity and the pricing endpoints.
pub const DEFAULT_BASE_URL: &str = "https://api.spresso.com";

/// Default token audience.
pub const DEFAULT_AUDIENCE: &str = "https://spresso-api";

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Client-credentials token acquisition.
    pub auth: AuthConfig,

    /// Price lookups, caching and overrides.
    pub pricing: PricingConfig,

    /// Logging settings used by the sample binary.
    pub observability: ObservabilityConfig,
}

/// Token endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the identity service.
    pub base_url: String,

    /// Audience requested in the token grant.
    pub audience: String,

    /// Client id issued for the application.
    pub client_id: String,

    /// Client secret issued for the application.
    pub client_secret: String,

    /// Cache namespace for tokens. Set this when several credentials or scope
    /// sets share one cache.
    pub token_group: String,

    /// Subset of scopes to request. Empty requests every scope granted to the client.
    pub scopes: Vec<String>,

    /// Extra query string appended to the token endpoint (debug/testing).
    pub additional_parameters: String,

    /// Resiliency policy around token requests.
    pub resiliency: ResiliencyConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            token_group: "default".to_string(),
            scopes: Vec::new(),
            additional_parameters: String::new(),
            resiliency: ResiliencyConfig {
                timeout_ms: 30_000,
                ..ResiliencyConfig::default()
            },
        }
    }
}

/// What to do when the user-agent override list cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverrideFetchPolicy {
    /// Proceed as if no override matched.
    #[default]
    FailOpen,
    /// Treat the request as overridden and serve default prices.
    FailClosed,
}

/// Pricing endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Base URL of the pricing service.
    pub base_url: String,

    /// Extra query string appended to pricing endpoints (debug/testing).
    pub additional_parameters: String,

    /// TTL of per-item price cache entries in seconds. Zero disables the price cache.
    pub cache_ttl_secs: u64,

    /// Key prefix for per-item price cache entries.
    pub cache_namespace: String,

    /// TTL of the cached user-agent override list in seconds.
    pub user_agent_cache_ttl_secs: u64,

    /// Behaviour when the override list cannot be fetched.
    pub override_fetch_policy: OverrideFetchPolicy,

    /// Short-circuit requests whose items are all outside the optimized SKU list.
    pub skip_inactive_skus: bool,

    /// Resiliency policy around pricing requests.
    pub resiliency: ResiliencyConfig,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            additional_parameters: String::new(),
            cache_ttl_secs: 60,
            cache_namespace: "spresso.prices".to_string(),
            user_agent_cache_ttl_secs: 24 * 60 * 60,
            override_fetch_policy: OverrideFetchPolicy::FailOpen,
            skip_inactive_skus: false,
            resiliency: ResiliencyConfig::default(),
        }
    }
}

impl PricingConfig {
    /// Per-item cache TTL, `None` when the price cache is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

/// Timeout, retry, circuit breaker and fallback settings for one remote operation kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResiliencyConfig {
    /// Retries after the first attempt (0-10).
    pub max_retries: u32,

    /// Overall time budget across all attempts in milliseconds (max 180s).
    pub timeout_ms: u64,

    /// Per-attempt HTTP timeout in milliseconds.
    pub http_timeout_ms: u64,

    /// Consecutive transient failures before the circuit opens (min 1).
    pub circuit_breaker_threshold: u32,

    /// How long the circuit stays open in seconds.
    pub circuit_breaker_break_secs: u64,

    /// Base delay for exponential backoff between retries in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Return the error instead of degraded default data after policies are exhausted.
    pub throw_on_failure: bool,
}

impl Default for ResiliencyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: 5_000,
            http_timeout_ms: 1_000,
            circuit_breaker_threshold: 10,
            circuit_breaker_break_secs: 60,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 1_000,
            throw_on_failure: false,
        }
    }
}

impl ResiliencyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_break_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.auth.token_group, "default");
        assert_eq!(config.auth.resiliency.timeout_ms, 30_000);
        assert_eq!(config.pricing.resiliency.max_retries, 3);
        assert_eq!(config.pricing.override_fetch_policy, OverrideFetchPolicy::FailOpen);
        assert_eq!(config.pricing.cache_ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_ttl_disables_price_cache() {
        let pricing = PricingConfig {
            cache_ttl_secs: 0,
            ..PricingConfig::default()
        };
        assert!(pricing.cache_ttl().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [auth]
            client_id = "abc"

            [pricing]
            override_fetch_policy = "fail_closed"

            [pricing.resiliency]
            max_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.client_id, "abc");
        assert_eq!(config.auth.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.pricing.override_fetch_policy, OverrideFetchPolicy::FailClosed);
        assert_eq!(config.pricing.resiliency.max_retries, 1);
        assert_eq!(config.pricing.resiliency.http_timeout_ms, 1_000);
    }
}

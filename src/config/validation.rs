//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (retries, timeouts, breaker threshold)
//! - Check that base URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::{ClientConfig, ResiliencyConfig};

/// Highest accepted retry count.
pub const MAX_RETRIES: u32 = 10;

/// Highest accepted overall timeout in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 180_000;

/// Highest accepted cache TTL in seconds (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// A single semantic violation, keyed by the dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole client configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url("auth.base_url", &config.auth.base_url, &mut errors);
    check_url("pricing.base_url", &config.pricing.base_url, &mut errors);
    check_resiliency("auth.resiliency", &config.auth.resiliency, &mut errors);
    check_resiliency("pricing.resiliency", &config.pricing.resiliency, &mut errors);

    check_ttl("pricing.cache_ttl_secs", config.pricing.cache_ttl_secs, &mut errors);
    check_ttl(
        "pricing.user_agent_cache_ttl_secs",
        config.pricing.user_agent_cache_ttl_secs,
        &mut errors,
    );

    if config.pricing.cache_namespace.is_empty() {
        errors.push(ValidationError::new("pricing.cache_namespace", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = url::Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}

fn check_ttl(field: &str, secs: u64, errors: &mut Vec<ValidationError>) {
    if secs > MAX_CACHE_TTL_SECS {
        errors.push(ValidationError::new(
            field,
            format!("must be at most {MAX_CACHE_TTL_SECS} seconds"),
        ));
    }
}

fn check_resiliency(prefix: &str, config: &ResiliencyConfig, errors: &mut Vec<ValidationError>) {
    if config.max_retries > MAX_RETRIES {
        errors.push(ValidationError::new(
            format!("{prefix}.max_retries"),
            format!("must be between 0 and {MAX_RETRIES}"),
        ));
    }
    if config.timeout_ms == 0 || config.timeout_ms > MAX_TIMEOUT_MS {
        errors.push(ValidationError::new(
            format!("{prefix}.timeout_ms"),
            format!("must be between 1 and {MAX_TIMEOUT_MS}"),
        ));
    }
    if config.http_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.http_timeout_ms"), "must be > 0"));
    }
    if config.circuit_breaker_threshold < 1 {
        errors.push(ValidationError::new(
            format!("{prefix}.circuit_breaker_threshold"),
            "must be >= 1",
        ));
    }
    if config.retry_max_delay_ms < config.retry_base_delay_ms {
        errors.push(ValidationError::new(
            format!("{prefix}.retry_max_delay_ms"),
            "must be >= retry_base_delay_ms",
        ));
    }
}

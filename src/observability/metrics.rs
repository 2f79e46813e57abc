//! Metrics collection.
//!
//! # Metrics
//! - `spresso_remote_calls_total` (counter): outbound calls by operation, outcome
//! - `spresso_remote_call_duration_seconds` (histogram): outbound latency by operation
//! - `spresso_cache_lookups_total` (counter): cache lookups by cache, result
//! - `spresso_circuit_breaker_transitions_total` (counter): by breaker, new state
//! - `spresso_fallbacks_total` (counter): degraded responses by operation, error
//! - `spresso_user_agent_overrides_total` (counter): requests short-circuited by override
//!
//! Recording is a no-op until the embedding application installs a recorder.

use std::time::Duration;

use metrics::{counter, histogram};

/// Record the outcome and latency of one outbound HTTP call.
pub fn record_remote_call(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "spresso_remote_calls_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("spresso_remote_call_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record a cache lookup.
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("spresso_cache_lookups_total", "cache" => cache, "result" => result).increment(1);
}

/// Record a circuit breaker state change.
pub fn record_breaker_transition(breaker: &str, state: &'static str) {
    counter!(
        "spresso_circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => state
    )
    .increment(1);
}

/// Record that an operation degraded to its fallback.
pub fn record_fallback(operation: &str, error: String) {
    counter!(
        "spresso_fallbacks_total",
        "operation" => operation.to_string(),
        "error" => error
    )
    .increment(1);
}

/// Record a request answered with default prices because of a user-agent override.
pub fn record_user_agent_override() {
    counter!("spresso_user_agent_overrides_total").increment(1);
}

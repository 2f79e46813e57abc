//! Composed resiliency executor.
//!
//! # Data Flow
//! ```text
//! execute_or_else(cancel, op, fallback)
//!     → breaker.try_acquire()      rejected → fallback, op never runs
//!     → timeouts::within(timeout)  deadline or cancel → timed_out()
//!         → retries.run(op)        transient → backoff → op again
//!     → permit.record(outcome)     cancellation is not recorded
//!     → fallback.resolve(outcome)
//! ```
//!
//! # Design Decisions
//! - Built once per remote operation kind and cloned freely; clones share the breaker
//! - Settings are clamped at build time so a bad config cannot disable a policy

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ResiliencyConfig;
use crate::resilience::{
    timeouts, Backoff, CircuitBreaker, CircuitState, Classify, FallbackPolicy, Resolved, RetryPolicy,
};

const MAX_RETRIES: u32 = 10;
const MAX_TIMEOUT: Duration = Duration::from_secs(180);

/// Fallback, circuit breaker, timeout and retry around one remote operation kind.
#[derive(Debug)]
pub struct ResilientExecutor<E> {
    name: String,
    timeout: Duration,
    retry: RetryPolicy,
    fallback: FallbackPolicy,
    breaker: Arc<CircuitBreaker<E>>,
}

impl<E> Clone for ResilientExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            timeout: self.timeout,
            retry: self.retry,
            fallback: self.fallback,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl<E: Classify> ResilientExecutor<E> {
    pub fn builder(name: impl Into<String>) -> ExecutorBuilder {
        ExecutorBuilder::new(name)
    }

    /// Executor configured from one `[*.resiliency]` table.
    pub fn from_config(name: impl Into<String>, config: &ResiliencyConfig) -> Self {
        ExecutorBuilder::new(name)
            .max_retries(config.max_retries)
            .timeout(config.timeout())
            .circuit_breaker(config.circuit_breaker_threshold, config.break_duration())
            .backoff(Backoff::new(
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ))
            .throw_on_failure(config.throw_on_failure)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Run `op` under breaker, timeout and retry. The error is whatever ended the call.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(error) => {
                tracing::debug!(operation = %self.name, error = %error, "Circuit open, rejecting call");
                return Err(error);
            }
        };

        let outcome = timeouts::within(self.timeout, cancel, self.retry.run(&self.name, cancel, &op)).await;

        if cancel.is_cancelled() {
            permit.release();
        } else {
            permit.record(&outcome);
        }
        outcome
    }

    /// `execute`, then apply the fallback policy.
    ///
    /// `Err` is only returned when `throw_on_failure` is set.
    pub async fn execute_or_else<T, F, Fut, D>(
        &self,
        cancel: &CancellationToken,
        op: F,
        fallback: D,
    ) -> Result<Resolved<T, E>, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        D: FnOnce(&E) -> T,
    {
        let outcome = self.execute(cancel, op).await;
        self.fallback.resolve(&self.name, outcome, fallback)
    }

    /// Apply the fallback policy to a failure raised outside the executor.
    pub fn recover<T, D>(&self, result: Result<T, E>, fallback: D) -> Result<Resolved<T, E>, E>
    where
        D: FnOnce(&E) -> T,
    {
        self.fallback.resolve(&self.name, result, fallback)
    }
}

/// Builder with the same defaults as `ResiliencyConfig`.
#[derive(Debug, Clone)]
pub struct ExecutorBuilder {
    name: String,
    max_retries: u32,
    timeout: Duration,
    threshold: u32,
    break_duration: Duration,
    backoff: Backoff,
    throw_on_failure: bool,
}

impl ExecutorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = ResiliencyConfig::default();
        Self {
            name: name.into(),
            max_retries: defaults.max_retries,
            timeout: defaults.timeout(),
            threshold: defaults.circuit_breaker_threshold,
            break_duration: defaults.break_duration(),
            backoff: Backoff::default(),
            throw_on_failure: defaults.throw_on_failure,
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        if retries > MAX_RETRIES {
            tracing::warn!(operation = %self.name, retries, max = MAX_RETRIES, "Clamping retry count");
        }
        self.max_retries = retries.min(MAX_RETRIES);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        if timeout > MAX_TIMEOUT {
            tracing::warn!(
                operation = %self.name,
                timeout_ms = timeout.as_millis() as u64,
                "Clamping timeout to 180s"
            );
        }
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    pub fn circuit_breaker(mut self, threshold: u32, break_duration: Duration) -> Self {
        if threshold == 0 {
            tracing::warn!(operation = %self.name, "Circuit breaker threshold must be at least 1");
        }
        self.threshold = threshold.max(1);
        self.break_duration = break_duration;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn throw_on_failure(mut self, throw: bool) -> Self {
        self.throw_on_failure = throw;
        self
    }

    pub fn build<E: Classify>(self) -> ResilientExecutor<E> {
        let breaker = CircuitBreaker::new(self.name.clone(), self.threshold, self.break_duration);
        ResilientExecutor {
            retry: RetryPolicy::new(self.max_retries, self.backoff),
            fallback: FallbackPolicy::new(self.throw_on_failure),
            timeout: self.timeout,
            breaker: Arc::new(breaker),
            name: self.name,
        }
    }
}

//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke an operation when its error is transient (`Classify::is_transient`)
//! - Wait with exponential backoff + jitter between attempts
//! - Stop immediately on cancellation
//!
//! # Design Decisions
//! - Non-transient errors (auth, bad request) are returned on the first occurrence
//! - A cancelled call never starts another attempt

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::resilience::{Backoff, Classify};

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self::new(0, Backoff::none())
    }

    /// Run `op` until it succeeds, fails non-transiently, or retries run out.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: &F,
    ) -> Result<T, E>
    where
        E: Classify,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(E::timed_out());
            }

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.max_retries || cancel.is_cancelled() {
                return Err(error);
            }

            attempt += 1;
            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                operation = %operation,
                attempt,
                max_retries = self.max_retries,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(error),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

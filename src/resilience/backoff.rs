//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Retry immediately.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 is the first call.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.base.is_zero() {
            return Duration::ZERO;
        }

        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let exponential_base = 2u64.saturating_pow(attempt - 1);
        let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

        // Apply jitter (0 to 10% of the delay)
        let jitter_range = capped_delay / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(1))
    }
}

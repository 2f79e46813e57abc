//! Circuit breaker for remote operation protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: remote assumed down, calls fail fast with the last error
//! - Half-Open: testing if the remote recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive transient failures >= threshold
//! Open → Half-Open: after break duration
//! Half-Open → Closed: probe call succeeds
//! Half-Open → Open: probe call fails (timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per remote operation kind (token fetch, price fetch, ...)
//! - Non-transient errors (auth, bad request) prove the remote is answering and count as success
//! - Single probe in Half-Open; a probe abandoned by cancellation frees the slot for the next caller
//! - Only the probe settles Half-Open; outcomes of calls admitted while Closed are dropped
//!   once the breaker has left Closed

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::resilience::Classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner<E> {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    last_error: Option<E>,
}

/// Shared breaker state for one remote operation kind.
#[derive(Debug)]
pub struct CircuitBreaker<E> {
    name: String,
    threshold: u32,
    break_duration: Duration,
    inner: Mutex<BreakerInner<E>>,
}

/// Admission ticket for one call. Dropping it without recording releases a half-open probe.
#[derive(Debug)]
pub struct Permit<'a, E: Classify> {
    breaker: &'a CircuitBreaker<E>,
    probe: bool,
    settled: bool,
}

impl<'a, E: Classify> Permit<'a, E> {
    /// Feed the call outcome back into the breaker.
    pub fn record<T>(mut self, outcome: &Result<T, E>) {
        self.settled = true;
        match outcome {
            Err(e) if e.is_transient() => self.breaker.on_failure(self.probe, e),
            _ => self.breaker.on_success(self.probe),
        }
    }

    /// Give the permit back without counting the call either way.
    pub fn release(self) {}
}

impl<'a, E: Classify> Drop for Permit<'a, E> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

impl<E: Classify> CircuitBreaker<E> {
    pub fn new(name: impl Into<String>, threshold: u32, break_duration: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            break_duration,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                last_error: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open breaker whose break has elapsed reports Half-Open.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) if at.elapsed() >= self.break_duration => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Consecutive transient failures seen since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to run a call. Rejections carry the error that opened the circuit.
    pub fn try_acquire(&self) -> Result<Permit<'_, E>, E> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit {
                breaker: self,
                probe: false,
                settled: false,
            }),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map_or(true, |at| at.elapsed() >= self.break_duration);
                if !elapsed {
                    return Err(Self::rejection(&inner));
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                tracing::info!(breaker = %self.name, "Circuit breaker moving to Half-Open");
                metrics::record_breaker_transition(&self.name, CircuitState::HalfOpen.as_str());
                Ok(Permit {
                    breaker: self,
                    probe: true,
                    settled: false,
                })
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(Self::rejection(&inner));
                }
                inner.probe_in_flight = true;
                Ok(Permit {
                    breaker: self,
                    probe: true,
                    settled: false,
                })
            }
        }
    }

    fn rejection(inner: &BreakerInner<E>) -> E {
        inner.last_error.clone().unwrap_or_else(E::timed_out)
    }

    /// The state a permit's outcome may act on: Half-Open for the probe, Closed otherwise.
    fn admits(inner: &BreakerInner<E>, probe: bool) -> bool {
        let expected = if probe { CircuitState::HalfOpen } else { CircuitState::Closed };
        inner.state == expected
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if !Self::admits(&inner, probe) {
            tracing::debug!(breaker = %self.name, state = inner.state.as_str(), "Ignoring stale success");
            return;
        }
        inner.consecutive_failures = 0;
        if probe {
            inner.probe_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.last_error = None;
            tracing::info!(breaker = %self.name, "Circuit breaker reset to Closed");
            metrics::record_breaker_transition(&self.name, CircuitState::Closed.as_str());
        }
    }

    fn on_failure(&self, probe: bool, error: &E) {
        let mut inner = self.lock();
        if !Self::admits(&inner, probe) {
            tracing::debug!(breaker = %self.name, state = inner.state.as_str(), "Ignoring stale failure");
            return;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_error = Some(error.clone());
        if probe {
            inner.probe_in_flight = false;
        }

        if probe || inner.consecutive_failures >= self.threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::error!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                break_ms = self.break_duration.as_millis() as u64,
                error = %error,
                "Circuit breaker tripped to Open"
            );
            metrics::record_breaker_transition(&self.name, CircuitState::Open.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::test_support::TestError;

    fn fail(breaker: &CircuitBreaker<TestError>, error: TestError) {
        breaker.try_acquire().unwrap().record::<()>(&Err(error));
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        fail(&breaker, TestError::Transient);
        fail(&breaker, TestError::Transient);
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker, TestError::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire().unwrap_err(), TestError::Transient);
    }

    #[test]
    fn test_non_transient_errors_reset_counter() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        fail(&breaker, TestError::Transient);
        fail(&breaker, TestError::Fatal);
        assert_eq!(breaker.consecutive_failures(), 0);
        fail(&breaker, TestError::Transient);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_allows_single_probe() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        fail(&breaker, TestError::Timeout);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.try_acquire().unwrap_err(), TestError::Timeout);

        probe.record::<u8>(&Ok(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        fail(&breaker, TestError::Transient);
        std::thread::sleep(Duration::from_millis(20));

        fail(&breaker, TestError::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn test_abandoned_probe_frees_slot() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        fail(&breaker, TestError::Transient);
        std::thread::sleep(Duration::from_millis(20));

        drop(breaker.try_acquire().unwrap());
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_stale_success_does_not_close_open_circuit() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(60));
        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();

        first.record::<()>(&Err(TestError::Transient));
        assert_eq!(breaker.state(), CircuitState::Open);

        second.record::<u8>(&Ok(1));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn test_stale_outcome_keeps_probe_exclusive() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        let stale_ok = breaker.try_acquire().unwrap();
        let stale_err = breaker.try_acquire().unwrap();
        fail(&breaker, TestError::Transient);
        std::thread::sleep(Duration::from_millis(20));

        let probe = breaker.try_acquire().unwrap();
        stale_ok.record::<u8>(&Ok(1));
        stale_err.record::<()>(&Err(TestError::Transient));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err());

        probe.record::<u8>(&Ok(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! ResilientExecutor::execute_or_else(op)
//!     → fallback.rs        (terminal failure → default value + typed error, or re-raise)
//!     → circuit_breaker.rs (fail fast while open, one probe when half-open)
//!     → timeouts.rs        (overall deadline + caller cancellation)
//!     → retries.rs         (re-invoke op on transient errors, backoff.rs between attempts)
//!     → op                 (one remote call, per-request HTTP timeout set by the http layer)
//! ```
//!
//! # Design Decisions
//! - Order is fixed by construction; retries can never run after the breaker rejected a call
//! - Errors are values: timeout and cancellation arrive as `Classify::timed_out()`
//! - One breaker per remote operation kind, shared by clones of the executor

pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod fallback;
pub mod retries;
pub mod timeouts;

use std::fmt;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use executor::{ExecutorBuilder, ResilientExecutor};
pub use fallback::{FallbackPolicy, Resolved};
pub use retries::RetryPolicy;

/// Error taxonomies the executor can reason about.
pub trait Classify: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Whether a failure is worth retrying and counts against the circuit breaker.
    fn is_transient(&self) -> bool;

    /// The value reported when a deadline passes or the caller cancels.
    fn timed_out() -> Self;
}

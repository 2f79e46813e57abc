//! Timeout enforcement.
//!
//! Wraps a call with the overall deadline and the caller's cancellation token.
//! Both outcomes surface as `Classify::timed_out()`; the inner future is dropped,
//! which aborts any in-flight request and any pending retry.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::resilience::Classify;

/// Run `fut` until it completes, `limit` elapses, or `cancel` fires.
pub async fn within<T, E, Fut>(limit: Duration, cancel: &CancellationToken, fut: Fut) -> Result<T, E>
where
    E: Classify,
    Fut: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Operation cancelled by caller");
            Err(E::timed_out())
        }
        outcome = tokio::time::timeout(limit, fut) => match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Operation timed out");
                Err(E::timed_out())
            }
        },
    }
}

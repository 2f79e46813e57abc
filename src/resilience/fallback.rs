//! Fallback stage.
//!
//! The outermost policy. Once timeout, retries and the circuit breaker have all
//! given up, the caller either gets a default value paired with the typed error
//! (`Resolved::degraded`) or, with `throw_on_failure`, the error itself.

use crate::observability::metrics;
use crate::resilience::Classify;

/// Outcome of an operation that never fails outward: a value, and the error
/// that forced it to be a default value, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T, E> {
    pub value: T,
    pub error: Option<E>,
}

impl<T, E> Resolved<T, E> {
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn degraded(value: T, error: E) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain result, dropping the default value on failure.
    pub fn into_result(self) -> Result<T, E> {
        match self.error {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub throw_on_failure: bool,
}

impl FallbackPolicy {
    pub fn new(throw_on_failure: bool) -> Self {
        Self { throw_on_failure }
    }

    /// Turn a terminal result into the caller-facing shape.
    ///
    /// `fallback` builds the default value from the error. It is not called
    /// when the error is re-raised.
    pub fn resolve<T, E, F>(&self, operation: &str, result: Result<T, E>, fallback: F) -> Result<Resolved<T, E>, E>
    where
        E: Classify,
        F: FnOnce(&E) -> T,
    {
        match result {
            Ok(value) => Ok(Resolved::ok(value)),
            Err(error) => {
                tracing::error!(
                    operation = %operation,
                    error = %error,
                    rethrow = self.throw_on_failure,
                    "Operation failed after resiliency policies"
                );
                metrics::record_fallback(operation, format!("{:?}", error));
                if self.throw_on_failure {
                    return Err(error);
                }
                let value = fallback(&error);
                Ok(Resolved::degraded(value, error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::test_support::TestError;

    #[test]
    fn test_success_passes_through() {
        let policy = FallbackPolicy::default();
        let resolved = policy.resolve("test", Ok::<_, TestError>(5), |_| 0).unwrap();
        assert_eq!(resolved, Resolved::ok(5));
        assert!(resolved.is_success());
    }

    #[test]
    fn test_failure_yields_default_and_error() {
        let policy = FallbackPolicy::default();
        let resolved = policy.resolve("test", Err(TestError::Fatal), |_| 0).unwrap();
        assert_eq!(resolved.value, 0);
        assert_eq!(resolved.error, Some(TestError::Fatal));
        assert_eq!(resolved.into_result(), Err(TestError::Fatal));
    }

    #[test]
    fn test_throw_on_failure_reraises() {
        let policy = FallbackPolicy::new(true);
        let mut called = false;
        let result = policy.resolve("test", Err::<u32, _>(TestError::Timeout), |_| {
            called = true;
            0
        });
        assert_eq!(result, Err(TestError::Timeout));
        assert!(!called);
    }
}

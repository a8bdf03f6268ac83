//! Bounded retry with classified errors and exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use deckforge_utils::error::ProviderError;

/// Retry policy applied around every transport call.
///
/// Only errors for which [`ProviderError::is_retryable`] holds are retried;
/// everything else propagates on first occurrence. Exhaustion propagates the
/// last retryable error — converting that into the sentinel empty/`None`
/// forms is the caller's decision, which keeps this wrapper reusable for any
/// operation shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// `max_retries` is the total invocation budget, not the count of
    /// re-attempts; it is clamped to at least 1.
    #[must_use]
    pub fn new(max_retries: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            min_backoff,
            max_backoff: max_backoff.max(min_backoff),
        }
    }

    /// Backoff before attempt `n + 1`, doubling from the minimum and clamped
    /// to the maximum.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails fatally, or the invocation
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(op = op_name, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    let wait = self.backoff(attempt);
                    warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %e,
                        backoff_ms = wait.as_millis() as u64,
                        "Retryable failure"
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => {
                    warn!(op = op_name, error = %e, "Fatal failure, not retrying");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Misconfiguration(
            format!("retry budget for {op_name} is zero"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited {
            provider: "test".into(),
            retry_after_secs: None,
        }
    }

    #[tokio::test]
    async fn persistent_retryable_failure_uses_exact_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(4)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = policy(5)
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::Auth {
                        provider: "test".into(),
                        reason: "bad key".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let p = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(3), Duration::from_millis(500));
        assert_eq!(p.backoff(10), Duration::from_millis(500));
    }
}

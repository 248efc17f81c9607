//! Retry policy and combinator.
//!
//! A [`RetryPolicy`] bundles the delay schedule, the attempt budget and the
//! predicate deciding which errors are worth another attempt. [`retry`]
//! drives any async operation under such a policy.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same interval before every retry
    Fixed,
    /// Interval doubles after every failure, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// Predicate deciding whether an error is retryable.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// How and how often to retry a failing operation.
pub struct RetryPolicy<E> {
    pub interval: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
    predicate: RetryPredicate<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("interval", &self.interval)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    /// Retry every error after a constant `interval`.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Fixed,
            predicate: Arc::new(|_| true),
        }
    }

    /// Retry every error, doubling the delay from `base` up to `max_delay`.
    pub fn exponential(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            interval: base,
            max_attempts,
            backoff: Backoff::Exponential { max_delay },
            predicate: Arc::new(|_| true),
        }
    }

    /// Only retry errors matching `predicate`.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max_delay } => {
                let exponent = failed_attempts.saturating_sub(1).min(31);
                self.interval
                    .checked_mul(1u32 << exponent)
                    .map(|d| d.min(max_delay))
                    .unwrap_or(max_delay)
            }
        }
    }
}

/// The last error of an operation that did not succeed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {error}")]
pub struct RetryError<E> {
    pub attempts: u32,
    pub error: E,
    /// True when the attempt budget ran out, false when the error was not retryable
    pub exhausted: bool,
}

/// Run `operation` until it succeeds or the policy gives up.
///
/// The operation receives the 1-based attempt number. The first attempt runs
/// immediately.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.should_retry(&error) {
                    debug!(attempt, error = %error, "Error is not retryable");
                    return Err(RetryError {
                        attempts: attempt,
                        error,
                        exhausted: false,
                    });
                }
                if attempt >= max_attempts {
                    return Err(RetryError {
                        attempts: attempt,
                        error,
                        exhausted: true,
                    });
                }

                let delay = policy.delay_after(attempt);
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy: RetryPolicy<String> =
            RetryPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 10);

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
        assert_eq!(policy.delay_after(5), Duration::from_secs(1));
        assert_eq!(policy.delay_after(40), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_delay() {
        let policy: RetryPolicy<String> = RetryPolicy::fixed(Duration::from_secs(30), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(2), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(Duration::from_secs(30), 3);
        let started = Instant::now();

        let result: Result<u32, RetryError<String>> = retry(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("attempt {} failed", attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1), 4);

        let err = retry(&policy, |attempt| async move { Err::<(), _>(format!("no {}", attempt)) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 4);
        assert!(err.exhausted);
        assert_eq!(err.error, "no 4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1), 5)
            .retry_if(|e: &String| e.starts_with("transient"));

        let err = retry(&policy, |attempt| async move {
            if attempt == 1 {
                Err::<(), _>("transient".to_string())
            } else {
                Err("fatal".to_string())
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert!(!err.exhausted);
        assert_eq!(err.error, "fatal");
    }

    #[tokio::test]
    async fn test_zero_budget_still_tries_once() {
        let policy = RetryPolicy::fixed(Duration::ZERO, 0);
        let err = retry(&policy, |_| async { Err::<(), _>("x".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
    }
}

//! Bounded retry with a per-attempt deadline.
//!
//! # Responsibilities
//! - Run an async operation up to N times
//! - Race each attempt against its own timeout
//! - Hand the last failure back to the caller once attempts run out
//!
//! # Design Decisions
//! - No delay between attempts; callers that need a grace period put it
//!   inside the operation
//! - A timed-out attempt is dropped, which cancels it

use std::future::Future;
use std::time::Duration;

/// Why the final attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(E),
}

/// Run `op` up to `attempts` times, each bounded by `per_attempt`.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_timeout<T, E, F, Fut>(
    attempts: u32,
    per_attempt: Duration,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut last_error = RetryError::TimedOut(per_attempt);

    for attempt in 1..=attempts {
        match tokio::time::timeout(per_attempt, op(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                tracing::debug!(attempt, attempts, error = %e, "Attempt failed");
                last_error = RetryError::Failed(e);
            }
            Err(_) => {
                tracing::debug!(attempt, attempts, timeout = ?per_attempt, "Attempt timed out");
                last_error = RetryError::TimedOut(per_attempt);
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            retry_with_timeout(3, Duration::from_secs(1), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err("refused".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let result: Result<(), RetryError<String>> =
            retry_with_timeout(3, Duration::from_secs(1), |attempt| async move {
                Err(format!("failure {}", attempt))
            })
            .await;
        assert_eq!(result, Err(RetryError::Failed("failure 3".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_each_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            retry_with_timeout(2, Duration::from_millis(100), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending()
            })
            .await;
        assert_eq!(result, Err(RetryError::TimedOut(Duration::from_millis(100))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

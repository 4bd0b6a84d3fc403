//! Bounded retry with exponential backoff and jitter
//!
//! Policy: 3 attempts, base 100ms, cap 2s. Rate-limit responses override
//! the computed delay with the server's Retry-After hint, capped at 60s.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Maximum attempts per invocation (initial call included)
pub const MAX_ATTEMPTS: u32 = 3;
/// Base backoff in milliseconds
pub const BASE_DELAY_MS: u64 = 100;
/// Backoff cap in milliseconds
pub const MAX_DELAY_MS: u64 = 2_000;
/// Retry-After cap in seconds
pub const RETRY_AFTER_CAP_SEC: u64 = 60;

/// Compute the backoff delay for a given attempt (0-based), with jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(MAX_DELAY_MS);
    // full jitter: uniform in [capped/2, capped]
    let jittered = rand::thread_rng().gen_range((capped / 2)..=capped);
    Duration::from_millis(jittered)
}

/// Delay to honor for a rate-limited response.
pub fn rate_limit_delay(retry_after: Option<u64>, attempt: u32) -> Duration {
    match retry_after {
        Some(secs) => Duration::from_secs(secs.min(RETRY_AFTER_CAP_SEC)),
        None => backoff_delay(attempt),
    }
}

/// Run `op` with bounded retries on transient failures.
///
/// Persistent errors (Validation, NotFound, Conflict, AuthExpired) are
/// returned immediately; transient errors are retried up to
/// [`MAX_ATTEMPTS`] and the last error is returned.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = match &e {
                    Error::RateLimited { retry_after, .. } => {
                        rate_limit_delay(*retry_after, attempt)
                    }
                    _ => backoff_delay(attempt),
                };
                tracing::warn!(
                    op = label,
                    attempt = attempt + 1,
                    max_attempts = MAX_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, backing off"
                );
                last_err = Some(e);
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Internal(format!("{label}: retries exhausted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        for _ in 0..50 {
            let d0 = backoff_delay(0).as_millis() as u64;
            assert!((50..=100).contains(&d0), "attempt 0 delay {d0}");
            let d1 = backoff_delay(1).as_millis() as u64;
            assert!((100..=200).contains(&d1), "attempt 1 delay {d1}");
            let d5 = backoff_delay(5).as_millis() as u64;
            assert!((1000..=2000).contains(&d5), "attempt 5 delay {d5}");
        }
    }

    #[test]
    fn retry_after_is_honored_and_capped() {
        assert_eq!(rate_limit_delay(Some(7), 0), Duration::from_secs(7));
        assert_eq!(rate_limit_delay(Some(600), 0), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Transient("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Validation("bad".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and the
//! crate-internal `with_retry()` helper the fetch coordinator wraps every
//! upstream call in, keeping retry logic in a single place.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::telemetry;
use crate::types::FetchKey;
use crate::{ProcedexError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses capped exponential backoff:
///
/// ```rust
/// # use procedex::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .attempt_timeout(Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Upper bound on a single attempt. Default: 30s.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt timeout (`None` = wait indefinitely).
    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting upstream `retry_after` hints.
    ///
    /// A `retry_after` hint (from a `RateLimited` error) takes precedence
    /// over the calculated backoff but is still capped at `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async fetch attempt with retry logic.
///
/// Retries on transient errors (as classified by
/// [`ProcedexError::is_transient()`]) up to `config.max_attempts`, using
/// exponential backoff and respecting `retry_after` hints. `NotFound` and
/// other permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, key: FetchKey, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let outcome = match config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, f())
                .await
                .unwrap_or(Err(ProcedexError::Timeout(limit))),
            None => f().await,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.effective_delay(attempt, e.retry_after());
                warn!(
                    %key,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                metrics::counter!(telemetry::RETRIES_TOTAL, "kind" => key.kind.as_str())
                    .increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(), FetchKey::procedure(1), || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ProcedexError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(), FetchKey::procedure(1), || async move {
            if counter.fetch_add(1, Ordering::Relaxed) < 2 {
                Err(ProcedexError::Http("connection reset".into()))
            } else {
                Ok(1)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let key = FetchKey::procedure(9);
        let result: Result<()> = with_retry(&fast(), key, || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Err(ProcedexError::NotFound(key))
        })
        .await;
        assert_eq!(result.unwrap_err(), ProcedexError::NotFound(key));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_with_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&fast(), FetchKey::costs(2), || async move {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            Err(ProcedexError::Http(format!("failure {n}")))
        })
        .await;
        assert_eq!(result.unwrap_err(), ProcedexError::Http("failure 2".into()));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = fast().max_attempts(0);
        let _ = with_retry(&config, FetchKey::steps(1), || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ProcedexError>(())
        })
        .await;
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out() {
        let config = RetryConfig::disabled().attempt_timeout(Some(Duration::from_secs(1)));
        let result: Result<()> = with_retry(&config, FetchKey::procedure(1), || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result.unwrap_err(),
            ProcedexError::Timeout(Duration::from_secs(1))
        );
    }
}

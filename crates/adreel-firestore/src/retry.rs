//! Retry policy with exponential backoff and jitter.
//!
//! Only transport-level failures are retried (network errors, 429, 5xx).
//! Preconditions, conflicts and other 4xx responses are returned as-is so
//! callers can resolve them.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_retry;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_u64("FIRESTORE_MAX_RETRIES")
                .map(|n| n as u32)
                .unwrap_or(defaults.max_retries),
            base_delay_ms: env_u64("FIRESTORE_RETRY_BASE_MS").unwrap_or(defaults.base_delay_ms),
            max_delay_ms: env_u64("FIRESTORE_RETRY_MAX_MS").unwrap_or(defaults.max_delay_ms),
        }
    }
}

/// Execute an async operation, retrying retryable failures.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = FirestoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        let span = info_span!("firestore_retry", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore operation failed, retrying: {}",
                    e
                );
                record_retry(operation);

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff with full jitter, floored at the base delay.
fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after);
    }

    let exp_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exp_delay.min(config.max_delay_ms);

    // Sub-second clock noise is enough spread for jitter here
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let factor = (nanos % 1000) as f64 / 1000.0;
    let jittered = (capped as f64 * factor) as u64;

    Duration::from_millis(jittered.max(config.base_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> FirestoreError {
        FirestoreError::ServerError(503, "unavailable".to_string())
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[test]
    fn test_calculate_delay_with_retry_after() {
        let delay = calculate_delay(&RetryConfig::default(), 0, Some(2000));
        assert_eq!(delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_calculate_delay_bounds() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        };
        let delay = calculate_delay(&config, 10, None);
        assert!(delay.as_millis() <= 2000);
        assert!(delay.as_millis() >= 1000);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_precondition() {
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FirestoreError::PreconditionFailed("stale".into()))
        })
        .await;
        assert!(result.unwrap_err().is_precondition_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

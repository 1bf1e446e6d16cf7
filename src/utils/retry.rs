//! Retry logic for network operations with exponential backoff.

use crate::core::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with custom max attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Create a config with custom initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a config for quick retries (shorter delays).
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Create a config for network operations (longer delays).
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Calculate the delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            delay_secs + jitter
        } else {
            delay_secs
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Pseudo-random jitter in [0, 1) from the clock's sub-second nanos.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Execute an async operation with retries.
///
/// Errors for which [`Error::is_retryable`] is false are returned unchanged
/// on the first failure. When every attempt fails with a retryable error the
/// result is `Error::TransferRetryExhausted`.
///
/// # Example
/// ```ignore
/// let meta = retry_async("signature refresh", RetryConfig::network(), || async {
///     download_feed().await
/// })
/// .await?;
/// ```
pub async fn retry_async<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = std::time::Instant::now();
    let mut last_error = String::new();

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!(
                        "{} succeeded on attempt {} after {:?}",
                        operation_name,
                        attempt,
                        start.elapsed()
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_retryable() {
                    log::debug!("{} failed with non-retryable error: {}", operation_name, e);
                    return Err(e);
                }

                last_error = e.to_string();

                if attempt == config.max_attempts {
                    log::warn!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        attempt,
                        last_error
                    );
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    config.max_attempts,
                    delay,
                    e
                );

                sleep(delay).await;
            }
        }
    }

    Err(Error::TransferRetryExhausted {
        operation: operation_name.to_string(),
        attempts: config.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn instant() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            add_jitter: false,
            ..RetryConfig::quick()
        }
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        // capped
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result = retry_async("test operation", instant(), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let mut attempts = 0;
        let result: Result<i32> = retry_async("failing operation", instant().with_max_attempts(2), || {
            attempts += 1;
            async { Err(Error::transfer("http://feed", "connection reset")) }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::TransferRetryExhausted { attempts: 2, .. })
        ));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returned_unchanged() {
        let mut attempts = 0;
        let result: Result<i32> = retry_async("archive", instant(), || {
            attempts += 1;
            async { Err(Error::archive(PathBuf::from("/x.zip"), "missing entry")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Archive { .. })));
        assert_eq!(attempts, 1);
    }
}

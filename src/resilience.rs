//! Retry and timeout helpers for calls to the artifact store.

use crate::error::{Result, ServeError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with the given attempt budget.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let delay = Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            // Up to 25% jitter
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
        } else {
            delay
        }
    }
}

/// Retry executor with exponential backoff.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a function with retries. Non-retryable errors return at once.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.config.max_attempts {
            attempt += 1;

            match f(attempt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt < self.config.max_attempts {
                        let delay = self.config.delay_for_attempt(attempt);
                        tracing::warn!(
                            attempt = attempt,
                            max_attempts = self.config.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying after failure"
                        );
                        sleep(delay).await;
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServeError::Internal("Retry exhausted without error".to_string())
        }))
    }
}

/// Execute an operation with a timeout.
pub async fn with_timeout<Fut, T>(timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ServeError::Timeout(timeout.as_millis() as u64))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_backoff() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_with_attempts_floor() {
        assert_eq!(RetryConfig::with_attempts(0).max_attempts, 1);
        assert_eq!(RetryConfig::with_attempts(3).max_attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast(2));

        let counter = calls.clone();
        let result = executor
            .execute(|_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ServeError::Network("reset".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast(5));

        let counter = calls.clone();
        let result: Result<()> = executor
            .execute(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ServeError::fetch("a/b:latest", "not found"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let executor = RetryExecutor::new(fast(2));
        let result: Result<()> = executor
            .execute(|attempt| async move { Err(ServeError::Network(format!("attempt {}", attempt))) })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "Network error: attempt 2");
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ServeError::Timeout(10))));

        let result = with_timeout(Duration::from_secs(1), async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}

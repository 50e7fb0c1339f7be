//! Retry logic for read-only requests
//!
//! The mediator never retries. The runner retries read-only requests whose
//! failure is retryable (an unavailable backend); everything else is
//! returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::warn;

use zmdata::error::MediatorError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Execute a mediator call, retrying retryable failures
pub async fn retry_async<T, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, MediatorError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, MediatorError>>,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    let retry_ms: u128 = duration.as_millis();
                    warn!(
                        operation = %operation_name,
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = retry_ms,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use zmdata::error::BackendError;

    fn quick(attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            ..RetryConfig::with_attempts(attempts)
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
    }

    #[tokio::test]
    async fn test_retries_unavailable_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_async(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(MediatorError::Backend(BackendError::Unavailable {
                        reason: "busy".into(),
                    }))
                } else {
                    Ok(7)
                }
            },
            &quick(3),
            "findMany",
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_async(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MediatorError::Backend(BackendError::not_found("Config")))
            },
            &quick(3),
            "findUniqueOrThrow",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Retry with exponential backoff for transient delivery failures.

use crate::core::{MetricaError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, first try included.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier between attempts.
    pub multiplier: f64,
    /// Add jitter to prevent synchronized retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            // At least 3 retries after the first attempt.
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Runs `operation` until it succeeds, the error stops being recoverable,
/// or the attempt budget is spent.
pub async fn retry_with_config<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_recoverable() || attempt >= config.max_attempts {
                    return Err(error);
                }

                if attempt > 1 {
                    backoff = Duration::from_secs_f64(backoff.as_secs_f64() * config.multiplier);
                    if backoff > config.max_backoff {
                        backoff = config.max_backoff;
                    }
                }

                let actual_backoff = if config.jitter {
                    let jitter_ms = fastrand::f64() * backoff.as_millis() as f64 * 0.1;
                    backoff + Duration::from_millis(jitter_ms as u64)
                } else {
                    backoff
                };

                tracing::warn!(
                    attempt,
                    error = %error,
                    backoff_ms = actual_backoff.as_millis() as u64,
                    "attempt failed, retrying"
                );

                sleep(actual_backoff).await;
            },
        }
    }
}

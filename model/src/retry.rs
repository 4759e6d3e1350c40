//! Generic exponential-backoff retry executor, shared by the embedding and
//! merge clients. Database-specific error classification is stripped
//! out here: callers decide retryability themselves via the
//! `should_retry` predicate.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Backoff configuration: attempt 0 waits `initial_delay`, each subsequent
/// attempt multiplies by `multiplier`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Build a config from `{prefix}_MAX_ATTEMPTS` / `{prefix}_INITIAL_DELAY_MS`
    /// / `{prefix}_MAX_DELAY_MS` environment variables, falling back to
    /// `default()` for anything unset or unparsable.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var(format!("{prefix}_MAX_ATTEMPTS")) {
            if let Ok(n) = v.parse::<usize>() {
                config.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var(format!("{prefix}_INITIAL_DELAY_MS")) {
            if let Ok(ms) = v.parse::<u64>() {
                config.initial_delay = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var(format!("{prefix}_MAX_DELAY_MS")) {
            if let Ok(ms) = v.parse::<u64>() {
                config.max_delay = Duration::from_millis(ms);
            }
        }

        config
    }

    /// # Errors
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }
        if self.initial_delay.is_zero() {
            anyhow::bail!("initial_delay must be greater than 0");
        }
        if self.max_delay < self.initial_delay {
            anyhow::bail!("max_delay must be >= initial_delay");
        }
        if self.multiplier <= 1.0 {
            anyhow::bail!("multiplier must be greater than 1.0");
        }
        Ok(())
    }

    #[must_use]
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }
        let pow = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(pow);
        let delay = Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()));
        if self.jitter {
            Self::add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let jitter_factor = rng.random_range(0.5..=1.0);
        Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
    }
}

/// Runs an async operation with exponential backoff, retrying only errors
/// the caller marks retryable.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation`, retrying up to `config.max_retries` times while
    /// `should_retry` returns true for the error.
    ///
    /// # Errors
    ///
    /// Returns the last error encountered once retries are exhausted or
    /// `should_retry` rejects an error.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F, should_retry: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(attempt, "operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let retryable = should_retry(&error);
                    if !retryable || attempt == self.config.max_retries {
                        error!(attempt, retryable, %error, "operation failed, giving up");
                        return Err(error);
                    }
                    let delay = self.config.calculate_delay(attempt);
                    warn!(attempt, ?delay, %error, "operation failed, retrying");
                    sleep(delay).await;
                }
            }
        }
        unreachable!("loop always returns on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delay_grows_and_caps_at_max() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(500));
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let config = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let attempts = AtomicUsize::new(0);
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        });

        let result: Result<u32, String> = executor
            .execute(
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient".to_string())
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let attempts = AtomicUsize::new(0);
        let executor = RetryExecutor::new(RetryConfig::default());

        let result: Result<u32, String> = executor
            .execute(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async move { Err("fatal".to_string()) }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

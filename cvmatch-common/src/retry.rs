//! Retry with exponential backoff
//!
//! One policy object serves every outbound client (catalog and completion
//! services) as well as the local store's lock handling.
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If the error is retryable and attempts remain: log WARN, back off, retry
//! 4. If the error is not retryable: return it immediately
//! 5. When attempts are exhausted: log ERROR, return the last error
//!
//! Delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`,
//! capped at `max_delay`.

use std::future::Future;
use std::time::{Duration, Instant};

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Policy that runs the operation exactly once
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Backoff to sleep after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let scaled = (self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent)).round();
        let capped = scaled.min(self.max_delay.as_nanos() as f64).max(0.0);
        Duration::from_nanos(capped as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached.
    ///
    /// # Arguments
    /// * `operation_name` - Name for logging (e.g., "catalog volume search")
    /// * `is_retryable` - Classifies an error; `false` aborts immediately
    /// * `operation` - Async closure performing one attempt
    pub async fn run<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        is_retryable: P,
        mut operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(operation = operation_name, attempt, "Retrying operation");
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !is_retryable(&err) {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Non-retryable error, giving up"
                        );
                        return Err(err);
                    }

                    if attempt >= max_attempts {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            error = %err,
                            "Operation failed: retry attempts exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.delay_for(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        backoff_ms = backoff.as_millis(),
                        error = %err,
                        "Operation failed, will retry after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = fast_policy(3)
            .run("test_op", |_: &String| true, || async { Ok::<i32, String>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let mut attempts = 0;

        let result = fast_policy(5)
            .run("test_op", |_: &String| true, || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 3 {
                        Err("temporarily unavailable".to_string())
                    } else {
                        Ok(current)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let mut attempts = 0;

        let result = fast_policy(5)
            .run(
                "test_op",
                |e: &String| !e.contains("authentication"),
                || {
                    attempts += 1;
                    async { Err::<i32, String>("authentication failed".to_string()) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let mut attempts = 0;

        let result = fast_policy(3)
            .run("test_op", |_: &String| true, || {
                attempts += 1;
                let current = attempts;
                async move { Err::<i32, String>(format!("failure {}", current)) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let mut attempts = 0;
        let policy = RetryPolicy {
            max_attempts: 0,
            ..fast_policy(1)
        };

        let _ = policy
            .run("test_op", |_: &String| true, || {
                attempts += 1;
                async { Err::<(), String>("nope".to_string()) }
            })
            .await;

        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn test_custom_multiplier() {
        let policy = RetryPolicy::new(4, Duration::from_millis(10)).with_multiplier(3.0);
        assert_eq!(policy.delay_for(3), Duration::from_millis(90));
    }
}

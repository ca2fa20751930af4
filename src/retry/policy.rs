//! Retry Mechanism Module
//!
//! Bounded retries with exponential backoff for token exchanges. Only errors
//! classified as transient by [`AuthError::is_retryable`] are retried; once
//! the budget is spent the last error is reported in its terminal form.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::time::sleep;

use crate::error::AuthError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Whether to randomize delays
    pub use_jitter: bool,
    /// Randomization factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self::default().with_max_retries(0)
    }

    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn should_retry(&self, error: &AuthError) -> bool {
        error.is_retryable()
    }

    /// Backoff schedule for one retry sequence.
    pub fn backoff(&self) -> ExponentialBackoff {
        let randomization = if self.use_jitter {
            self.jitter_factor
        } else {
            0.0
        };
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.backoff_multiplier)
            .with_randomization_factor(randomization)
            // attempts are bounded by `max_retries`, not by wall time
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Retry executor that handles the actual retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying transient failures up to the policy budget.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AuthError>>,
    {
        let mut schedule = self.policy.backoff();
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if self.policy.should_retry(&error) && retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = schedule
                        .next_backoff()
                        .unwrap_or(self.policy.max_delay);
                    tracing::warn!(
                        attempt = retries,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying token exchange after transient failure"
                    );
                    sleep(delay).await;
                }
                Err(error) => return Err(error.into_terminal()),
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Platform;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(false)
    }

    fn timeout() -> AuthError {
        AuthError::NetworkTimeout {
            platform: Platform::Cloud,
            message: "deadline elapsed".to_string(),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_retry_success_on_second_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy().with_max_retries(3));

        let result = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(timeout())
                    } else {
                        Ok("token")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(logs_contain("retrying token exchange"));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_terminal_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy().with_max_retries(2));

        let result: Result<(), AuthError> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(timeout())
                }
            })
            .await;

        // one attempt plus two retries
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(AuthError::AuthExchangeFailed {
                status_code: None,
                platform: Platform::Cloud,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy());

        let result: Result<(), AuthError> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AuthError::exchange_failed(
                        Some(401),
                        Platform::SoftwareHub,
                        "invalid credentials",
                    ))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().status_code(), Some(401));
    }

    #[tokio::test]
    async fn test_no_retries_policy_runs_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryPolicy::no_retries());

        let _ = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(timeout())
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_schedule_grows_exponentially() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);
        let mut schedule = policy.backoff();

        let expected = [100u128, 200, 300, 300];
        for want in expected {
            let got = schedule.next_backoff().unwrap().as_millis();
            assert!((want..=want + 1).contains(&got), "expected ~{want}ms, got {got}ms");
        }
    }
}

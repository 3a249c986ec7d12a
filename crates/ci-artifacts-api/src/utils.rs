//! Common utilities for talking to Jenkins

use std::time::Duration;

use crate::CiResult;

/// Number of attempts for every remote call. Jenkins under load drops
/// connections and a plain retry is usually enough.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings
    pub fn new(max_attempts: usize, initial_delay: Duration, exponential_backoff: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            exponential_backoff,
        }
    }

    /// Fixed number of attempts without any delay in between
    pub fn transient() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::ZERO, false)
    }

    /// Executes an operation with retry logic
    ///
    /// Only transient network errors are retried, everything else is returned
    /// right away.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use ci_artifacts_api::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// let result = policy.retry("whoami", || async {
    ///     // Your async operation here
    ///     Ok(())
    /// }).await?;
    /// ```
    pub async fn retry<F, Fut, T>(&self, what: &str, operation: F) -> CiResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CiResult<T>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "{what}: attempt {attempt}/{} failed: {e}",
                        self.max_attempts
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if self.exponential_backoff {
                        delay *= 2;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

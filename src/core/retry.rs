//! Bounded retry policy applied at the per-user settlement boundary.
//!
//! The attempt count and delays are configured once and shared by the sweeper and
//! the claim path. Only errors the caller marks as retryable are retried.

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy, clamping attempts to at least one and `max_delay` to at least `base_delay`.
    #[must_use]
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Same delay between every attempt.
    #[must_use]
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay)
    }

    /// Delay slept after the failed attempt number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 2_u32.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or attempts
    /// run out. `op` receives the zero-based attempt number.
    pub async fn retry_async<F, Fut, T, E, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, self.max_attempts, err, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(200))
    }
}

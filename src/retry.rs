//! Bounded exponential backoff shared by every component.
//!
//! Senders and stores do not inline retry loops; they hand the operation and a
//! retryability classifier to [`with_backoff`] and let the policy bound the
//! attempts.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

/// Retry budget: attempt count plus the backoff curve.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Backoff before retry number `attempt` (0-based): exponential doubling
    /// capped at `max_delay`, with ±25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        jittered(exp)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay, config.max_delay)
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Runs `op`, retrying while `retryable` says the error is worth another
/// attempt and the budget is not exhausted. The final error is returned
/// unchanged so the caller can make its commit decision.
pub async fn with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
    retryable: R,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && retryable(&e) => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                log::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempt,
                    policy.max_retries,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

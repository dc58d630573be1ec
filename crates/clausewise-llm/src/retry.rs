use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use clausewise_core::config::RetryConfig;
use clausewise_core::error::ServiceError;

use crate::clock::Clock;

/// Exponential backoff: `base_delay * 2^(n-1)` before retry `n`, capped at
/// `max_delay`. With jitter the delay is scaled by a random factor in
/// `[0.5, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO, jitter: false }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, clock: &dyn Clock, label: &str, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && err.is_retryable() => {
                let delay = policy.delay_for(attempt);
                warn!(call = label, attempt, max_attempts = attempts, delay_ms = delay.as_millis() as u64, error = %err, "external call failed, retrying");
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

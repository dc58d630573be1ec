use std::future::Future;
use std::sync::Arc;

use clausewise_core::error::ServiceError;

use crate::clock::Clock;
use crate::limiter::SlidingWindowLimiter;
use crate::retry::{retry, RetryPolicy};

/// Retry policy plus optional shared rate limiter, applied around every
/// external call. Each attempt takes its own limiter slot.
#[derive(Clone)]
pub struct ServiceGuard {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    limiter: Option<Arc<SlidingWindowLimiter>>,
}

impl ServiceGuard {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock, limiter: None }
    }

    pub fn with_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        retry(&self.policy, self.clock.as_ref(), label, |_| {
            let limiter = self.limiter.clone();
            let attempt = op();
            async move {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                attempt.await
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[tokio::test]
    async fn every_attempt_takes_a_limiter_slot() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(SlidingWindowLimiter::new(50, Duration::from_secs(60), clock.clone()));
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(10), max_delay: Duration::from_millis(10), jitter: false };
        let guard = ServiceGuard::new(policy, clock).with_limiter(limiter.clone());

        let out: Result<(), _> = guard.call("flaky", || async { Err(ServiceError::Unavailable("down".into())) }).await;
        assert!(out.is_err());
        assert_eq!(limiter.admitted(), 3);
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use clausewise_core::config::RateLimitConfig;

use crate::clock::Clock;

/// Sliding-window limiter: at most `max_calls` admissions in any `window`.
///
/// `acquire` blocks (via the clock) until the oldest admission leaves the
/// window. The lock is released before sleeping.
pub struct SlidingWindowLimiter {
    max_calls: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    calls: Mutex<VecDeque<Instant>>,
    admitted: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(max_calls: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { max_calls: max_calls.max(1), window, clock, calls: Mutex::new(VecDeque::new()), admitted: AtomicU64::new(0) }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.max_calls, Duration::from_secs(config.window_secs), clock)
    }

    /// Admit now, or return how long to wait before trying again.
    fn try_admit(&self) -> Result<(), Duration> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() < self.max_calls {
            calls.push_back(now);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let oldest = calls.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    pub async fn acquire(&self) {
        loop {
            match self.try_admit() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                    self.clock.sleep(wait).await;
                }
            }
        }
    }

    /// Calls currently counted inside the window.
    pub fn in_window(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        calls.iter().filter(|&&t| now.saturating_duration_since(t) < self.window).count()
    }

    /// Total admissions since creation.
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

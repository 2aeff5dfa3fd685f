//! Minimum-interval rate limiting for upstream APIs
//!
//! Each provider endpoint gets its own limiter. Callers queue on the limiter,
//! so concurrent feeds and signal sources sharing a client stay spaced out.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, min_interval: Duration) -> Self {
        Self {
            name,
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// A limiter that never waits
    pub fn unlimited(name: &'static str) -> Self {
        Self::new(name, Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time left before the next request may go out
    pub async fn check_rate_limit(&self) -> Option<Duration> {
        let last = self.last_request.lock().await;
        let elapsed = (*last)?.elapsed();
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }

    /// Wait until a request can be made, then record it
    pub async fn wait_if_needed(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::trace!(api = self.name, wait_ms = wait.as_millis() as u64, "Rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

//! Minimum-spacing rate limiter, one per indexer.
//!
//! Trackers that declare a request delay get a [`RateLimiter`] in front of
//! their transport. Unlike a token bucket there is no burst allowance: two
//! requests are never closer together than the configured interval.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub struct RateLimiter {
    min_interval: Duration,
    /// When the last request was let through. Held across the sleep so that
    /// concurrent callers queue up one interval apart.
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Build from a Definition's `request_delay_secs`, if it declares one.
    pub fn from_delay_secs(delay: Option<f64>) -> Option<Self> {
        let delay = delay?;
        if delay <= 0.0 {
            return None;
        }
        Some(Self::new(Duration::from_secs_f64(delay)))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the interval since the previously granted request has
    /// passed, then claim the slot.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Claim the slot only if it is free right now.
    ///
    /// Returns `Err(wait)` with the remaining wait time when the interval has
    /// not elapsed yet.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        if self.min_interval.is_zero() {
            return Ok(());
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

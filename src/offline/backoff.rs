//! Retry backoff schedule for queued deliveries

use std::time::Duration;

use crate::config::defaults;

/// Exponential backoff: `delay = base * multiplier^retry_count`, capped.
///
/// With the defaults (100 ms base, 1.5 growth, 30 s cap) the first few
/// retries land at 100 / 150 / 225 / 337.5 / 506.25 ms — fast enough to ride
/// out a brief endpoint hiccup without hammering a downed one.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: f64,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// Delay before the next attempt for an item that has failed
    /// `retry_count` times.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        // exponent clamped for the i32 cast; overflow to infinity hits the cap
        let factor = self.multiplier.powi(retry_count.min(64) as i32);
        let secs = (self.base.as_secs_f64() * factor).min(self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(defaults::BACKOFF_BASE_MS),
            defaults::BACKOFF_MULTIPLIER,
            Duration::from_secs(defaults::BACKOFF_CAP_SECS),
        )
    }
}

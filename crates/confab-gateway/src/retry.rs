//! Retry policy with exponential backoff and jitter.
//!
//! Only errors the taxonomy marks recoverable (timeout, rate-limited,
//! transient network) are retried, and only up to the configured
//! attempt cap. The constants have not been empirically validated in
//! production, so all of them are tunable through config rather than
//! hardcoded at call sites.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff parameters.
///
/// `delay(attempt) = min(base * multiplier^attempt + jitter, max_delay)`
/// where `jitter` is uniform in `[0, jitter_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// First-retry base delay, in milliseconds.
    pub base_ms: u64,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay, in milliseconds.
    pub jitter_ms: u64,
    /// Total execution attempts (first try included).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            multiplier: 1.8,
            max_delay_ms: 25_000,
            jitter_ms: 250,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Returns `true` if another attempt is allowed after `attempt`
    /// (1-based) failures.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Computes the delay before retry number `attempt` (1-based: the
    /// delay after the first failure is `delay_before(1)`).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exp = self.base_ms as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        let delay_ms = (exp as u64).saturating_add(jitter).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

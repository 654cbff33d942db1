//! # Per-key Exponential Backoff
//!
//! Rate limiter used by the work queue when a key is re-added after a failed sync.
//! Each key tracks its own failure count, so one misbehaving resource never slows
//! down the others.
//!
//! The delay for the n-th consecutive failure of a key is `base * 2^n`, capped at `max`.
//! With the defaults (5ms base, 1000s cap) the sequence is 5ms, 10ms, 20ms, 40ms, ...
//!
//! ## Usage
//!
//! ```rust
//! use cassandra_controller::controller::backoff::ItemExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(backoff.when("default/ring"), Duration::from_millis(5));
//! assert_eq!(backoff.when("default/ring"), Duration::from_millis(10));
//! backoff.forget("default/ring");
//! assert_eq!(backoff.when("default/ring"), Duration::from_millis(5));
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Exponential backoff calculator keyed by reconcile key
#[derive(Debug, Clone)]
pub struct ItemExponentialBackoff {
    /// Delay returned for the first failure
    base: Duration,
    /// Upper bound for any returned delay
    max: Duration,
    /// Consecutive failures per key
    failures: HashMap<String, u32>,
}

impl ItemExponentialBackoff {
    /// Create a new backoff with the given base delay and cap
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: HashMap::new(),
        }
    }

    /// Get the delay before `key` may be retried and record one more failure
    pub fn when(&mut self, key: &str) -> Duration {
        let failures = self.failures.entry(key.to_string()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);
        self.delay_for(exponent)
    }

    /// Number of failures recorded for `key` since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Reset the backoff for `key`, typically after a successful sync
    pub fn forget(&mut self, key: &str) {
        self.failures.remove(key);
    }

    fn delay_for(&self, exponent: u32) -> Duration {
        // 2^31 * base already dwarfs any sane cap
        let factor = 1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

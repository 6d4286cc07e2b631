//! # Exponential Backoff
//!
//! Per-key retry delays for failed reconciles. The delay doubles with every
//! consecutive failure of a key, starting at the base delay and capped at the
//! maximum: 5ms, 10ms, 20ms, ... 1000s with the defaults.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Exponential backoff calculator
///
/// Stateless: [`RetryTracker`] keeps the failure count per key and asks for
/// the delay that count maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `base` and never exceeding `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next retry of a key that has already failed
    /// `failures` times in a row (0 for the first retry).
    ///
    /// `base * 2^failures`, capped at `max`.
    #[must_use]
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        1u32.checked_shl(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

/// Consecutive failure counts per key, mapped to retry delays
#[derive(Debug)]
pub struct RetryTracker<K> {
    backoff: ExponentialBackoff,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash> RetryTracker<K> {
    /// Track failures, delaying retries by `backoff`
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record another failure of `key` and return the delay before its retry
    pub fn record_failure(&self, key: K) -> Duration {
        let mut failures = self.lock();
        let count = failures.entry(key).or_insert(0);
        let delay = self.backoff.delay_for_failures(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Reset the failure count of `key` after a successful reconcile
    pub fn forget(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn retries(&self, key: &K) -> u32 {
        self.lock().get(key).copied().unwrap_or(0)
    }
}

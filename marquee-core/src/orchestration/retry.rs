use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry/backoff policy consulted whenever a task hits a transient failure.
///
/// `max_attempts` counts executions, so the default of 4 allows the first
/// run plus three retries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub multiplier: f64,
    /// Proportional jitter around the computed delay (0.1 = within ±10%).
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 5_000,
            backoff_max_ms: 300_000,
            multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            multiplier: 1.0,
            jitter_ratio: 0.0,
        }
    }

    /// Whether another execution is allowed after `attempts_made` runs.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }

    /// Deterministic delay after the `attempt`-th (1-based) failed run:
    /// `min(base * multiplier^(attempt-1), max)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let base_ms = self.backoff_base_ms as f64 * factor;
        let capped = base_ms.min(self.backoff_max_ms as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// [`Self::base_delay`] moved by up to ±`jitter_ratio`, never past
    /// `backoff_max_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let base_ms = delay.as_millis() as f64;
        let spread = base_ms * ratio;
        let jittered = base_ms + rand::rng().random_range(-spread..=spread);
        let capped = jittered.min(self.backoff_max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let policy = RetryPolicy {
            jitter_ratio: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.base_delay(1), Duration::from_secs(5));
        assert_eq!(policy.base_delay(2), Duration::from_secs(10));
        assert_eq!(policy.base_delay(3), Duration::from_secs(20));
        assert_eq!(policy.base_delay(20), Duration::from_secs(300));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let policy = RetryPolicy::default();
        for attempt in 1..=4 {
            let base = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay_for(attempt);
                assert!(delay + Duration::from_millis(1) >= base.mul_f64(0.9));
                assert!(delay <= base.mul_f64(1.1) + Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn jitter_never_exceeds_backoff_max() {
        let policy = RetryPolicy {
            jitter_ratio: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..200 {
            assert!(policy.delay_for(20) <= Duration::from_millis(policy.backoff_max_ms));
        }
    }

    #[test]
    fn max_attempts_counts_total_runs() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
        assert!(!RetryPolicy::immediate(1).allows_retry(1));
    }
}

//! Admission control for outbound metadata requests.
//!
//! [`SlidingWindowLimiter`] keeps the timestamps of the last `limit`
//! admissions. A new caller is admitted once the oldest of those timestamps
//! has aged out of the window, so no interval of length `window` ever sees
//! more than `limit` admissions. Waiters queue on a FIFO-fair
//! [`tokio::sync::Mutex`] and the lock is held while sleeping, which keeps
//! admission order equal to arrival order.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Budget applied by a [`SlidingWindowLimiter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Admissions permitted per window.
    pub limit: u32,
    /// Window length.
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            limit: 1,
            window: Duration::from_secs(1),
        }
    }
}

pub struct SlidingWindowLimiter {
    rule: RateLimitRule,
    admissions: Mutex<VecDeque<Instant>>,
}

impl fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("limit", &self.rule.limit)
            .field("window", &self.rule.window)
            .finish_non_exhaustive()
    }
}

impl SlidingWindowLimiter {
    /// A zero limit is clamped to one so `acquire` can always make progress.
    pub fn new(rule: RateLimitRule) -> Self {
        let rule = RateLimitRule {
            limit: rule.limit.max(1),
            window: rule.window,
        };
        Self {
            rule,
            admissions: Mutex::new(VecDeque::with_capacity(rule.limit as usize)),
        }
    }

    pub fn rule(&self) -> RateLimitRule {
        self.rule
    }

    /// Waits until a slot is free, then records the admission.
    pub async fn acquire(&self) {
        let mut admissions = self.admissions.lock().await;
        loop {
            let now = Instant::now();
            self.evict_expired(&mut admissions, now);
            if admissions.len() < self.rule.limit as usize {
                admissions.push_back(now);
                return;
            }
            // Full log: the oldest entry decides when the next slot opens.
            let Some(oldest) = admissions.front().copied() else {
                continue;
            };
            let ready_at = oldest + self.rule.window;
            debug!(
                wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                "rate limiter saturated, waiting for slot"
            );
            sleep_until(ready_at).await;
        }
    }

    /// Admits immediately when a slot is free; never waits.
    ///
    /// Returns `false` when the window is full or another caller currently
    /// holds the admission lock.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut admissions) = self.admissions.try_lock() else {
            return false;
        };
        let now = Instant::now();
        self.evict_expired(&mut admissions, now);
        if admissions.len() < self.rule.limit as usize {
            admissions.push_back(now);
            true
        } else {
            false
        }
    }

    /// Snapshot of free slots in the current window.
    pub async fn available(&self) -> u32 {
        let mut admissions = self.admissions.lock().await;
        self.evict_expired(&mut admissions, Instant::now());
        self.rule.limit - admissions.len() as u32
    }

    fn evict_expired(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = admissions.front() {
            if now.saturating_duration_since(*front) >= self.rule.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(limit: u32, window_ms: u64) -> Arc<SlidingWindowLimiter> {
        Arc::new(SlidingWindowLimiter::new(RateLimitRule::new(
            limit,
            Duration::from_millis(window_ms),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = limiter(3, 1_000);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_oldest_admission_expires() {
        let limiter = limiter(2, 1_000);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_respects_budget() {
        let limiter = limiter(1, 500);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn no_window_exceeds_limit_under_concurrency() {
        let limit = 3;
        let window = Duration::from_millis(1_000);
        let limiter = limiter(limit, 1_000);
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        for (i, at) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|other| other.duration_since(*at) < window)
                .count();
            assert!(
                in_window <= limit as usize,
                "window starting at {:?} admitted {in_window}",
                at.duration_since(start)
            );
        }
        // 20 callers at 3 per second need at least six full windows.
        assert!(
            admitted.last().unwrap().duration_since(start)
                >= Duration::from_millis(6_000)
        );
    }

    #[test]
    fn zero_limit_is_clamped() {
        let limiter = SlidingWindowLimiter::new(RateLimitRule::new(
            0,
            Duration::from_secs(1),
        ));
        assert_eq!(limiter.rule().limit, 1);
    }
}

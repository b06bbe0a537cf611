use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

/// Knobs for the label worker runtime. Every field has a default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: WorkerConfig,
    pub lease: LeaseConfig,
    pub retry: RetryPolicy,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty (ms).
    pub idle_poll_ms: u64,
    /// Sleep after a queue error before polling again (ms).
    pub error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            idle_poll_ms: 100,
            error_backoff_ms: 250,
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Lease tuning for claimed tasks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// TTL granted on dequeue and on every renewal (seconds).
    pub lease_ttl_secs: i64,
    /// Renew once this fraction of the TTL has elapsed.
    pub renew_at_fraction: f32,
    /// Cadence of the expired-lease scan (ms).
    pub housekeeper_interval_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 60,
            renew_at_fraction: 0.5,
            housekeeper_interval_ms: 15_000,
        }
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs.max(1))
    }

    pub fn renew_interval(&self) -> Duration {
        let ttl_ms = self.lease_ttl_secs.max(1) as f64 * 1_000.0;
        let fraction = f64::from(self.renew_at_fraction.clamp(0.1, 0.9));
        Duration::from_millis((ttl_ms * fraction) as u64)
    }

    pub fn housekeeper_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeper_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_interval_is_fraction_of_ttl() {
        let lease = LeaseConfig {
            lease_ttl_secs: 30,
            renew_at_fraction: 0.5,
            housekeeper_interval_ms: 1_000,
        };
        assert_eq!(lease.renew_interval(), Duration::from_secs(15));
        assert_eq!(lease.ttl(), chrono::Duration::seconds(30));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"workers":{"concurrency":8}}"#).unwrap();
        assert_eq!(config.workers.concurrency, 8);
        assert_eq!(config.workers.idle_poll_ms, 100);
        assert_eq!(config.retry.max_attempts, 4);
    }
}

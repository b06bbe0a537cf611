use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use marquee_core::catalog::PlexConfig;
use marquee_core::labels::LabelRules;
use marquee_core::orchestration::{
    LeaseConfig, RedisQueueConfig, RetryPolicy, RuntimeConfig, WorkerConfig,
};
use marquee_core::providers::ImdbProviderConfig;
use marquee_core::rate_limit::RateLimitRule;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PLEX_URL: &str = "http://nas:32400";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
pub const DEFAULT_QUEUE_PREFIX: &str = "marquee";

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub plex: PlexSettings,
    pub queue: QueueSettings,
    pub provider: MetadataProviderConfig,
    pub workers: WorkerSettings,
    pub retry: RetrySettings,
    pub labels: LabelSettings,
    pub logging: LoggingConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn plex_config(&self) -> PlexConfig {
        PlexConfig {
            base_url: self.plex.url.clone(),
            token: self.plex.token.clone().unwrap_or_default(),
            timeout: self.plex.timeout,
        }
    }

    pub fn imdb_config(&self) -> ImdbProviderConfig {
        ImdbProviderConfig {
            base_url: self.provider.base_url.clone(),
            timeout: self.provider.timeout,
            ..ImdbProviderConfig::default()
        }
    }

    pub fn rate_limit_rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.provider.rate_limit, self.provider.rate_window)
    }

    pub fn redis_queue_config(&self) -> RedisQueueConfig {
        RedisQueueConfig {
            url: self.queue.redis_url.clone(),
            prefix: self.queue.prefix.clone(),
            dead_letter_cap: self.queue.dead_letter_cap,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base_ms: self.retry.backoff_base.as_millis() as u64,
            backoff_max_ms: self.retry.backoff_max.as_millis() as u64,
            multiplier: self.retry.multiplier,
            jitter_ratio: self.retry.jitter_ratio,
        }
    }

    pub fn label_rules(&self) -> LabelRules {
        LabelRules {
            max_labels: self.labels.max_labels,
            max_label_length: self.labels.max_label_length,
            deny: self.labels.deny.clone(),
            allow: self.labels.allow.clone(),
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            workers: WorkerConfig {
                concurrency: self.workers.concurrency,
                ..WorkerConfig::default()
            },
            lease: LeaseConfig {
                lease_ttl_secs: self.workers.lease_ttl.as_secs() as i64,
                housekeeper_interval_ms: self.workers.housekeeper_interval.as_millis()
                    as u64,
                ..LeaseConfig::default()
            },
            retry: self.retry_policy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct PlexSettings {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for PlexSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(QueueBackend::Redis),
            "memory" | "in-memory" | "inmemory" => Ok(QueueBackend::Memory),
            other => Err(format!("unknown queue backend `{other}`")),
        }
    }
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackend::Redis => f.write_str("redis"),
            QueueBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub backend: QueueBackend,
    pub redis_url: String,
    pub prefix: String,
    pub dead_letter_cap: usize,
}

#[derive(Debug, Clone)]
pub struct MetadataProviderConfig {
    pub base_url: String,
    /// Requests admitted per `rate_window`.
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub lease_ttl: Duration,
    pub housekeeper_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub multiplier: f64,
    pub jitter_ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LabelSettings {
    pub max_labels: usize,
    pub max_label_length: usize,
    pub deny: Vec<String>,
    pub allow: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" | "plain" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{LogFormat, QueueBackend};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub plex: FilePlexConfig,
    #[serde(default)]
    pub queue: FileQueueConfig,
    #[serde(default)]
    pub imdb: FileImdbConfig,
    #[serde(default)]
    pub workers: FileWorkerConfig,
    #[serde(default)]
    pub retry: FileRetryConfig,
    #[serde(default)]
    pub labels: FileLabelConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePlexConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Humantime string such as `10s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileQueueConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<QueueBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_cap: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileImdbConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWorkerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housekeeper_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ratio: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLabelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_labels: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_label_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub queue_backend: Option<QueueBackend>,
    pub redis_url: Option<String>,
    pub queue_prefix: Option<String>,
    pub imdb_base_url: Option<String>,
    pub rate_limit: Option<u32>,
    pub rate_window: Option<Duration>,
    pub http_timeout: Option<Duration>,
    pub worker_concurrency: Option<usize>,
    pub retry_max_attempts: Option<u32>,
    pub retry_backoff_base: Option<Duration>,
    pub retry_backoff_max: Option<Duration>,
    pub labels_max: Option<usize>,
    pub labels_deny: Option<Vec<String>>,
    pub labels_allow: Option<Vec<String>>,
    pub log_format: Option<LogFormat>,
    pub config_path: Option<PathBuf>,
    /// Variables that were set but could not be parsed, as `(name, value)`.
    pub rejected: Vec<(String, String)>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment view from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = EnvReader {
            lookup,
            rejected: Vec::new(),
        };

        let mut env_config = Self {
            server_host: reader.string("SERVER_HOST"),
            server_port: reader.parsed("SERVER_PORT"),
            plex_url: reader.string("PLEX_URL"),
            plex_token: reader.string("PLEX_TOKEN"),
            queue_backend: reader.parsed("QUEUE_BACKEND"),
            redis_url: reader.string("REDIS_URL"),
            queue_prefix: reader.string("QUEUE_PREFIX"),
            imdb_base_url: reader.string("IMDB_BASE_URL"),
            rate_limit: reader.parsed("METADATA_RATE_LIMIT"),
            rate_window: reader.duration("METADATA_RATE_WINDOW"),
            http_timeout: reader.duration("HTTP_TIMEOUT"),
            worker_concurrency: reader.parsed("WORKER_CONCURRENCY"),
            retry_max_attempts: reader.parsed("RETRY_MAX_ATTEMPTS"),
            retry_backoff_base: reader.duration("RETRY_BACKOFF_BASE"),
            retry_backoff_max: reader.duration("RETRY_BACKOFF_MAX"),
            labels_max: reader.parsed("LABELS_MAX"),
            labels_deny: reader.csv("LABELS_DENY"),
            labels_allow: reader.csv("LABELS_ALLOW"),
            log_format: reader.parsed("LOG_FORMAT"),
            config_path: reader.string("MARQUEE_CONFIG").map(PathBuf::from),
            rejected: Vec::new(),
        };
        env_config.rejected = reader.rejected;
        env_config
    }
}

struct EnvReader<F> {
    lookup: F,
    rejected: Vec<(String, String)>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&mut self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.rejected.push((name.to_string(), raw));
                None
            }
        }
    }

    fn duration(&mut self, name: &str) -> Option<Duration> {
        let raw = self.string(name)?;
        match parse_duration(&raw) {
            Some(value) => Some(value),
            None => {
                self.rejected.push((name.to_string(), raw));
                None
            }
        }
    }

    fn csv(&self, name: &str) -> Option<Vec<String>> {
        self.string(name).map(|raw| split_csv(&raw))
    }
}

/// Parses `30s`/`1m 30s` style durations; a bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).ok()
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn reads_typed_values() {
        let cfg = env(&[
            ("SERVER_PORT", "9000"),
            ("QUEUE_BACKEND", "memory"),
            ("METADATA_RATE_WINDOW", "2s"),
            ("HTTP_TIMEOUT", "15"),
            ("LABELS_DENY", "spoiler, , twist ending"),
            ("LOG_FORMAT", "JSON"),
        ]);
        assert_eq!(cfg.server_port, Some(9000));
        assert_eq!(cfg.queue_backend, Some(QueueBackend::Memory));
        assert_eq!(cfg.rate_window, Some(Duration::from_secs(2)));
        assert_eq!(cfg.http_timeout, Some(Duration::from_secs(15)));
        assert_eq!(
            cfg.labels_deny,
            Some(vec!["spoiler".to_string(), "twist ending".to_string()])
        );
        assert_eq!(cfg.log_format, Some(LogFormat::Json));
        assert!(cfg.rejected.is_empty());
    }

    #[test]
    fn unparsable_values_are_rejected_not_dropped_silently() {
        let cfg = env(&[("SERVER_PORT", "http"), ("HTTP_TIMEOUT", "soon")]);
        assert_eq!(cfg.server_port, None);
        assert_eq!(cfg.http_timeout, None);
        let names: Vec<_> = cfg.rejected.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["SERVER_PORT", "HTTP_TIMEOUT"]);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = env(&[("PLEX_TOKEN", "   ")]);
        assert!(cfg.plex_token.is_none());
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let raw = r#"
            [plex]
            url = "http://plex.local:32400"

            [queue]
            backend = "memory"

            [labels]
            deny = ["spoiler"]
        "#;
        let cfg: FileConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.plex.url.as_deref(), Some("http://plex.local:32400"));
        assert_eq!(cfg.queue.backend, Some(QueueBackend::Memory));
        assert_eq!(cfg.labels.deny, Some(vec!["spoiler".to_string()]));
        assert!(cfg.retry.max_attempts.is_none());
    }
}

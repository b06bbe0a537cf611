use thiserror::Error;
use url::Url;

use crate::models::{Config, QueueBackend};

const PLACEHOLDER_TOKENS: &[&str] = &["changeme", "your-plex-token", "token"];

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} must be a valid http(s) URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },
    #[error("retry jitter ratio must be within 0.0..=1.0, got {0}")]
    JitterOutOfRange(f64),
    #[error("retry multiplier must be at least 1.0, got {0}")]
    MultiplierTooSmall(f64),
    #[error("queue prefix must not be empty")]
    EmptyQueuePrefix,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    require_http_url("PLEX_URL", &config.plex.url)?;
    require_http_url("IMDB_BASE_URL", &config.provider.base_url)?;

    if config.provider.rate_limit == 0 {
        return Err(ConfigGuardRailError::NonPositive {
            field: "METADATA_RATE_LIMIT",
        });
    }
    if config.provider.rate_window.is_zero() {
        return Err(ConfigGuardRailError::NonPositive {
            field: "METADATA_RATE_WINDOW",
        });
    }
    if config.workers.concurrency == 0 {
        return Err(ConfigGuardRailError::NonPositive {
            field: "WORKER_CONCURRENCY",
        });
    }
    if config.workers.lease_ttl.as_secs() == 0 {
        return Err(ConfigGuardRailError::NonPositive {
            field: "workers.lease_ttl",
        });
    }
    if config.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::NonPositive {
            field: "RETRY_MAX_ATTEMPTS",
        });
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_ratio) {
        return Err(ConfigGuardRailError::JitterOutOfRange(
            config.retry.jitter_ratio,
        ));
    }
    if config.retry.multiplier.is_nan() || config.retry.multiplier < 1.0 {
        return Err(ConfigGuardRailError::MultiplierTooSmall(
            config.retry.multiplier,
        ));
    }
    if config.labels.max_label_length == 0 {
        return Err(ConfigGuardRailError::NonPositive {
            field: "labels.max_label_length",
        });
    }

    match config.queue.backend {
        QueueBackend::Redis => {
            if config.queue.prefix.trim().is_empty() {
                return Err(ConfigGuardRailError::EmptyQueuePrefix);
            }
            Url::parse(&config.queue.redis_url).map_err(|err| {
                ConfigGuardRailError::InvalidUrl {
                    field: "REDIS_URL",
                    reason: err.to_string(),
                }
            })?;
        }
        QueueBackend::Memory => warnings.push_with_hint(
            "QUEUE_BACKEND=memory; queued tasks are lost on restart",
            "Use the redis backend outside of local development",
        ),
    }

    match config.plex.token.as_deref() {
        None => warnings.push_with_hint(
            "PLEX_TOKEN not configured; catalog requests will be rejected",
            "Set PLEX_TOKEN to the X-Plex-Token of the server owner",
        ),
        Some(token)
            if PLACEHOLDER_TOKENS
                .iter()
                .any(|placeholder| token.eq_ignore_ascii_case(placeholder)) =>
        {
            warnings.push_with_hint(
                "PLEX_TOKEN looks like a placeholder value",
                "Replace it with a real X-Plex-Token",
            )
        }
        Some(_) => {}
    }

    if config.retry.backoff_max < config.retry.backoff_base {
        warnings.push(format!(
            "retry backoff_max ({}) is below backoff_base ({}); every retry waits backoff_max",
            humantime::format_duration(config.retry.backoff_max),
            humantime::format_duration(config.retry.backoff_base),
        ));
    }

    if config.labels.max_labels == 0 {
        warnings.push("labels.max_labels is 0; every title will be left unlabeled");
    }

    Ok(warnings)
}

fn require_http_url(
    field: &'static str,
    raw: &str,
) -> Result<(), ConfigGuardRailError> {
    let url = Url::parse(raw).map_err(|err| ConfigGuardRailError::InvalidUrl {
        field,
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigGuardRailError::InvalidUrl {
            field,
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

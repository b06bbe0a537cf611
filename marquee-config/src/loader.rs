use once_cell::sync::Lazy;
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};
use thiserror::Error;

use marquee_core::http::DEFAULT_HTTP_TIMEOUT;
use marquee_core::labels::LabelRules;
use marquee_core::orchestration::queue::DEFAULT_DEAD_LETTER_CAP;
use marquee_core::orchestration::{LeaseConfig, RetryPolicy, WorkerConfig};
use marquee_core::providers::ImdbProviderConfig;
use marquee_core::rate_limit::RateLimitRule;

use crate::models::{
    Config, ConfigMetadata, DEFAULT_PLEX_URL, DEFAULT_QUEUE_PREFIX,
    DEFAULT_REDIS_URL, LabelSettings, LoggingConfig, MetadataProviderConfig,
    PlexSettings, QueueSettings, RetrySettings, ServerConfig, WorkerSettings,
};
use crate::sources::{self, EnvConfig, FileConfig};
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("marquee.toml"),
        PathBuf::from("config/marquee.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
    env_override: Option<EnvConfig>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Uses `env` instead of reading the process environment. No `.env`
    /// file is loaded in this mode.
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env_override = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = match &self.env_override {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) = self.compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path),
            None => dotenvy::dotenv().map(|_| ()),
        };
        match result {
            Ok(()) => Ok(true),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
        env_file_loaded: bool,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No marquee.toml detected; using environment variables and defaults",
                "Create marquee.toml or pass --config to pin settings in a file",
            );
        }
        for (name, value) in &env.rejected {
            warnings.push_with_hint(
                format!("Ignoring {name}={value}: value could not be parsed"),
                "Numbers must be plain integers; durations accept `30s` or bare seconds",
            );
        }

        let FileConfig {
            server: file_server,
            plex: file_plex,
            queue: file_queue,
            imdb: file_imdb,
            workers: file_workers,
            retry: file_retry,
            labels: file_labels,
            logging: file_logging,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(8000),
        };

        let plex = PlexSettings {
            url: env
                .plex_url
                .or(file_plex.url)
                .unwrap_or_else(|| DEFAULT_PLEX_URL.to_string()),
            token: env.plex_token.or(file_plex.token),
            timeout: env
                .http_timeout
                .or(file_duration("plex.timeout", file_plex.timeout)?)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
        };

        let queue = QueueSettings {
            backend: env
                .queue_backend
                .or(file_queue.backend)
                .unwrap_or_default(),
            redis_url: env
                .redis_url
                .or(file_queue.redis_url)
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            prefix: env
                .queue_prefix
                .or(file_queue.prefix)
                .unwrap_or_else(|| DEFAULT_QUEUE_PREFIX.to_string()),
            dead_letter_cap: file_queue
                .dead_letter_cap
                .unwrap_or(DEFAULT_DEAD_LETTER_CAP),
        };

        let default_rule = RateLimitRule::default();
        let provider = MetadataProviderConfig {
            base_url: env
                .imdb_base_url
                .or(file_imdb.base_url)
                .unwrap_or_else(|| ImdbProviderConfig::default().base_url),
            rate_limit: env
                .rate_limit
                .or(file_imdb.rate_limit)
                .unwrap_or(default_rule.limit),
            rate_window: env
                .rate_window
                .or(file_duration("imdb.rate_window", file_imdb.rate_window)?)
                .unwrap_or(default_rule.window),
            timeout: env
                .http_timeout
                .or(file_duration("imdb.timeout", file_imdb.timeout)?)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
        };

        let default_workers = WorkerConfig::default();
        let default_lease = LeaseConfig::default();
        let workers = WorkerSettings {
            concurrency: env
                .worker_concurrency
                .or(file_workers.concurrency)
                .unwrap_or(default_workers.concurrency),
            lease_ttl: file_duration("workers.lease_ttl", file_workers.lease_ttl)?
                .unwrap_or(Duration::from_secs(default_lease.lease_ttl_secs.max(1) as u64)),
            housekeeper_interval: file_duration(
                "workers.housekeeper_interval",
                file_workers.housekeeper_interval,
            )?
            .unwrap_or_else(|| default_lease.housekeeper_interval()),
        };

        let default_retry = RetryPolicy::default();
        let retry = RetrySettings {
            max_attempts: env
                .retry_max_attempts
                .or(file_retry.max_attempts)
                .unwrap_or(default_retry.max_attempts),
            backoff_base: env
                .retry_backoff_base
                .or(file_duration("retry.backoff_base", file_retry.backoff_base)?)
                .unwrap_or(Duration::from_millis(default_retry.backoff_base_ms)),
            backoff_max: env
                .retry_backoff_max
                .or(file_duration("retry.backoff_max", file_retry.backoff_max)?)
                .unwrap_or(Duration::from_millis(default_retry.backoff_max_ms)),
            multiplier: file_retry.multiplier.unwrap_or(default_retry.multiplier),
            jitter_ratio: file_retry
                .jitter_ratio
                .unwrap_or(default_retry.jitter_ratio),
        };

        let default_rules = LabelRules::default();
        let labels = LabelSettings {
            max_labels: env
                .labels_max
                .or(file_labels.max_labels)
                .unwrap_or(default_rules.max_labels),
            max_label_length: file_labels
                .max_label_length
                .unwrap_or(default_rules.max_label_length),
            deny: env.labels_deny.or(file_labels.deny).unwrap_or_default(),
            allow: env.labels_allow.or(file_labels.allow).unwrap_or_default(),
        };

        let logging = LoggingConfig {
            format: env.log_format.or(file_logging.format).unwrap_or_default(),
        };

        let config = Config {
            server,
            plex,
            queue,
            provider,
            workers,
            retry,
            labels,
            logging,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok((config, warnings))
    }
}

fn file_duration(
    key: &'static str,
    raw: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    match raw {
        None => Ok(None),
        Some(value) => match sources::parse_duration(&value) {
            Some(duration) => Ok(Some(duration)),
            None => Err(ConfigLoadError::InvalidDuration { key, value }),
        },
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration for {key}: '{value}'")]
    InvalidDuration { key: &'static str, value: String },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

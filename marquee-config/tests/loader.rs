use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use marquee_config::sources::EnvConfig;
use marquee_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, LogFormat, QueueBackend,
};
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> EnvConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::from_lookup(|name| map.get(name).cloned())
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("marquee.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn defaults_apply_with_empty_file() {
    let dir = TempDir::new().unwrap();
    let load = ConfigLoader::new()
        .with_env(env(&[]))
        .with_config_path(write_config(&dir, ""))
        .load()
        .unwrap();
    let config = load.config;

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.plex.url, "http://nas:32400");
    assert_eq!(config.queue.backend, QueueBackend::Redis);
    assert_eq!(config.queue.redis_url, "redis://localhost:6379/0");
    assert_eq!(config.provider.rate_limit, 1);
    assert_eq!(config.provider.rate_window, Duration::from_secs(1));
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.labels.max_labels, 50);
    assert_eq!(config.logging.format, LogFormat::Pretty);

    let policy = config.retry_policy();
    assert_eq!(policy.backoff_base_ms, 5_000);
    assert_eq!(policy.backoff_max_ms, 300_000);

    let messages: Vec<_> = load.warnings.items.iter().map(|w| &w.message).collect();
    assert!(messages.iter().any(|m| m.contains("PLEX_TOKEN")));
}

#[test]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [server]
        port = 9100

        [plex]
        url = "http://plex.file:32400"
        token = "file-token"

        [imdb]
        rate_limit = 5
        rate_window = "10s"

        [retry]
        max_attempts = 6
        backoff_base = "1s"

        [labels]
        deny = ["spoiler"]
        "#,
    );

    let config = ConfigLoader::new()
        .with_config_path(&path)
        .with_env(env(&[
            ("PLEX_URL", "http://plex.env:32400"),
            ("RETRY_MAX_ATTEMPTS", "2"),
            ("LABELS_DENY", "gore,violence"),
        ]))
        .load()
        .unwrap()
        .config;

    assert_eq!(config.server.port, 9100);
    assert_eq!(config.plex.url, "http://plex.env:32400");
    assert_eq!(config.plex.token.as_deref(), Some("file-token"));
    assert_eq!(config.provider.rate_limit, 5);
    assert_eq!(config.provider.rate_window, Duration::from_secs(10));
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.backoff_base, Duration::from_secs(1));
    assert_eq!(config.labels.deny, vec!["gore", "violence"]);
    assert_eq!(config.metadata.config_path.as_deref(), Some(path.as_path()));

    let rule = config.rate_limit_rule();
    assert_eq!(rule.limit, 5);
    assert_eq!(config.label_rules().deny, vec!["gore", "violence"]);

    let runtime = config.runtime_config();
    assert_eq!(runtime.retry.max_attempts, 2);
    assert_eq!(runtime.retry.backoff_base_ms, 1_000);
    assert_eq!(runtime.retry, config.retry_policy());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .with_env(env(&[]))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn config_path_from_environment_must_exist() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = ConfigLoader::new()
        .with_env(env(&[("MARQUEE_CONFIG", missing.to_str().unwrap())]))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_toml_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server\nport = ");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .with_env(env(&[]))
        .load()
        .unwrap_err();
    match err {
        ConfigLoadError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn invalid_file_duration_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[imdb]\nrate_window = \"whenever\"\n");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .with_env(env(&[]))
        .load()
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidDuration { key: "imdb.rate_window", .. }
    ));
}

#[test]
fn guard_rails_reject_unusable_settings() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let cases = [
        ("METADATA_RATE_LIMIT", "0"),
        ("WORKER_CONCURRENCY", "0"),
        ("RETRY_MAX_ATTEMPTS", "0"),
    ];
    for (name, value) in cases {
        let err = ConfigLoader::new()
            .with_config_path(&path)
            .with_env(env(&[(name, value)]))
            .load()
            .unwrap_err();
        assert!(
            matches!(
                err,
                ConfigLoadError::GuardRail(ConfigGuardRailError::NonPositive { field }) if field == name
            ),
            "{name}: unexpected error {err:?}"
        );
    }

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .with_env(env(&[("PLEX_URL", "ftp://nas")]))
        .load()
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::InvalidUrl { field: "PLEX_URL", .. })
    ));

    let jitter = write_config(&dir, "[retry]\njitter_ratio = 1.5\n");
    let err = ConfigLoader::new()
        .with_config_path(&jitter)
        .with_env(env(&[]))
        .load()
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::JitterOutOfRange(_))
    ));
}

#[test]
fn memory_backend_and_bad_env_values_produce_warnings() {
    let dir = TempDir::new().unwrap();
    let load = ConfigLoader::new()
        .with_config_path(write_config(&dir, ""))
        .with_env(env(&[
            ("QUEUE_BACKEND", "memory"),
            ("PLEX_TOKEN", "real-token"),
            ("HTTP_TIMEOUT", "eventually"),
        ]))
        .load()
        .unwrap();

    assert_eq!(load.config.queue.backend, QueueBackend::Memory);
    assert_eq!(load.config.plex.timeout, Duration::from_secs(10));
    let messages: Vec<_> = load.warnings.items.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("QUEUE_BACKEND=memory")));
    assert!(messages.iter().any(|m| m.contains("HTTP_TIMEOUT")));
    assert!(!messages.iter().any(|m| m.contains("PLEX_TOKEN")));
}

#[test]
fn debug_output_redacts_plex_token() {
    let dir = TempDir::new().unwrap();
    let config = ConfigLoader::new()
        .with_config_path(write_config(&dir, ""))
        .with_env(env(&[("PLEX_TOKEN", "super-secret")]))
        .load()
        .unwrap()
        .config;
    assert!(!format!("{config:?}").contains("super-secret"));
    assert_eq!(config.plex_config().token, "super-secret");
}

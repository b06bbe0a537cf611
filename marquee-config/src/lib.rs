//! Configuration for Marquee.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional `marquee.toml`, and the process environment (optionally seeded
//! from a `.env` file). The loader also runs guard rails that reject
//! unusable settings and collect warnings for risky ones.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader};
pub use models::{
    Config, ConfigMetadata, LabelSettings, LogFormat, LoggingConfig,
    MetadataProviderConfig, PlexSettings, QueueBackend, QueueSettings,
    RetrySettings, ServerConfig, WorkerSettings,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};

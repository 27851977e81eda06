//! Configuration for Immich Album Watcher
//!
//! The service reads one YAML file. Values may come from `secrets.yaml`
//! (`!secret key`) or the environment (`!env_var VAR [default]`), and the
//! result is deserialized into a validated [`WatcherConfig`].
//!
//! ```ignore
//! let config = iaw_config::WatcherConfig::load("/config/immich.yaml")?;
//! ```

mod error;
mod loader;
mod secrets;
mod watcher_config;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};
pub use watcher_config::{
    AlbumConfig, WatcherConfig, DEFAULT_ENTRY_ID, DEFAULT_HUB_NAME, DEFAULT_NEW_ASSETS_WINDOW,
    DEFAULT_SCAN_INTERVAL, DEFAULT_TELEGRAM_CACHE_TTL, MIN_SCAN_INTERVAL,
};

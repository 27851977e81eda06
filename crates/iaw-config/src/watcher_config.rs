//! Typed service configuration
//!
//! ```yaml
//! hub_name: Home Photos
//! immich_url: http://immich.local:2283
//! api_key: !secret immich_api_key
//! scan_interval: 60
//! telegram_bot_token: !env_var TELEGRAM_BOT_TOKEN
//! albums:
//!   - album_id: 0f1e2d3c-...
//!     album_name: Family
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_HUB_NAME: &str = "Immich";
/// Seconds between polls
pub const DEFAULT_SCAN_INTERVAL: u64 = 60;
pub const MIN_SCAN_INTERVAL: u64 = 10;
/// Seconds the new-assets flag stays raised after a change
pub const DEFAULT_NEW_ASSETS_WINDOW: u64 = 300;
/// Hours a Telegram file id stays reusable
pub const DEFAULT_TELEGRAM_CACHE_TTL: u64 = 48;
pub const DEFAULT_ENTRY_ID: &str = "default";

/// One watched album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumConfig {
    pub album_id: String,
    /// Display name used until the first poll reports the real one
    #[serde(default)]
    pub album_name: Option<String>,
}

impl AlbumConfig {
    pub fn display_name(&self) -> &str {
        self.album_name.as_deref().unwrap_or(&self.album_id)
    }
}

/// Configuration for one hub (one Immich server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_hub_name")]
    pub hub_name: String,
    pub immich_url: String,
    pub api_key: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default = "default_telegram_cache_ttl")]
    pub telegram_cache_ttl: u64,
    #[serde(default = "default_new_assets_window")]
    pub new_assets_window: u64,
    /// Directory holding `.storage/`; defaults to the config file's directory
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Distinguishes state files of several hubs sharing a storage dir
    #[serde(default = "default_entry_id")]
    pub entry_id: String,
    #[serde(default)]
    pub albums: Vec<AlbumConfig>,
}

fn default_hub_name() -> String {
    DEFAULT_HUB_NAME.to_string()
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

fn default_telegram_cache_ttl() -> u64 {
    DEFAULT_TELEGRAM_CACHE_TTL
}

fn default_new_assets_window() -> u64 {
    DEFAULT_NEW_ASSETS_WINDOW
}

fn default_entry_id() -> String {
    DEFAULT_ENTRY_ID.to_string()
}

impl WatcherConfig {
    /// Minimal configuration for a server, with every default applied
    pub fn new(immich_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            hub_name: default_hub_name(),
            immich_url: immich_url.into(),
            api_key: api_key.into(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            telegram_bot_token: None,
            telegram_cache_ttl: DEFAULT_TELEGRAM_CACHE_TTL,
            new_assets_window: DEFAULT_NEW_ASSETS_WINDOW,
            storage_dir: None,
            entry_id: default_entry_id(),
            albums: Vec::new(),
        }
    }

    /// Load, resolve tags, deserialize and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let value = load_yaml(path)?;
        let mut config: Self = serde_yaml::from_value(value).map_err(ConfigError::Schema)?;

        if config.storage_dir.is_none() {
            config.storage_dir = path.parent().map(Path::to_path_buf);
        }
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config document that has already been tag-processed
    pub fn from_yaml_value(value: serde_yaml::Value) -> ConfigResult<Self> {
        let mut config: Self = serde_yaml::from_value(value).map_err(ConfigError::Schema)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.immich_url = self.immich_url.trim().trim_end_matches('/').to_string();
        self.telegram_bot_token = self
            .telegram_bot_token
            .take()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.immich_url.starts_with("http://") || self.immich_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "immich_url".to_string(),
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "api_key".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.scan_interval < MIN_SCAN_INTERVAL {
            return Err(ConfigError::InvalidValue {
                key: "scan_interval".to_string(),
                reason: format!("must be at least {MIN_SCAN_INTERVAL} seconds"),
            });
        }
        if self.telegram_cache_ttl == 0 {
            return Err(ConfigError::InvalidValue {
                key: "telegram_cache_ttl".to_string(),
                reason: "must be at least 1 hour".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for album in &self.albums {
            if album.album_id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    message: "album entry with an empty album_id".to_string(),
                });
            }
            if !seen.insert(album.album_id.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("album {} is listed more than once", album.album_id),
                });
            }
        }

        Ok(())
    }

    /// Where `.storage/` lives
    pub fn storage_root(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

//! `secrets.yaml` lookup for the `!secret` tag

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// File name looked up next to the main configuration file
pub const SECRETS_FILE: &str = "secrets.yaml";

/// Secret values keyed by name
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Load `secrets.yaml` from `config_dir`; a missing file yields no secrets
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);

        if !path.exists() {
            debug!("No {} at {:?}", SECRETS_FILE, path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        let raw: HashMap<String, Value> =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
                path: path.clone(),
                source: e,
            })?;

        let values: HashMap<String, String> = raw
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
            .collect();

        debug!("Loaded {} secrets from {:?}", values.len(), path);
        Ok(Self { values })
    }

    /// Build a secrets store from in-memory pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Secrets are scalars; nested values are ignored
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_secrets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SECRETS_FILE),
            "immich_api_key: abc123\nbot_token: 123:XYZ\nport: 2283\nnested:\n  a: 1\n",
        )
        .unwrap();

        let secrets = Secrets::load(dir.path()).unwrap();
        assert_eq!(secrets.get("immich_api_key").unwrap(), "abc123");
        assert_eq!(secrets.get("bot_token").unwrap(), "123:XYZ");
        assert_eq!(secrets.get("port").unwrap(), "2283");
        assert_eq!(secrets.len(), 3);
    }

    #[test]
    fn test_missing_secret() {
        let secrets = Secrets::from_pairs([("key", "value")]);
        assert!(matches!(
            secrets.get("nonexistent"),
            Err(ConfigError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_no_secrets_file() {
        let dir = TempDir::new().unwrap();
        assert!(Secrets::load(dir.path()).unwrap().is_empty());
    }
}

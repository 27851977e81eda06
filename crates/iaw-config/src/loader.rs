//! YAML loading with tag substitution
//!
//! Supported tags:
//! - `!secret key` - value from `secrets.yaml` next to the loaded file
//! - `!env_var VAR [default]` - environment variable, with an optional fallback

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Loads YAML documents and resolves custom tags
pub struct YamlLoader {
    secrets: Secrets,
}

impl YamlLoader {
    /// Create a loader reading `secrets.yaml` from `config_dir`
    pub fn new(config_dir: &Path) -> ConfigResult<Self> {
        Ok(Self {
            secrets: Secrets::load(config_dir)?,
        })
    }

    /// Create a loader with pre-loaded secrets
    pub fn with_secrets(secrets: Secrets) -> Self {
        Self { secrets }
    }

    /// Read and process a YAML file
    pub fn load_file(&self, path: &Path) -> ConfigResult<Value> {
        debug!("Loading YAML file: {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.load_str(&content, path)
    }

    /// Parse and process YAML text; `source` is only used in errors
    pub fn load_str(&self, content: &str, source: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.process(value)
    }

    fn process(&self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged),
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(self.process(k)?, self.process(v)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process(v))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn process_tagged(&self, tagged: TaggedValue) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}'", tag);

        match tag.as_str() {
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                let secret = self.secrets.get(key)?;
                debug!("Substituted secret: {}", key);
                Ok(Value::String(secret.to_string()))
            }
            "!env_var" => {
                let arg = tag_argument(&tag, &tagged.value)?;
                resolve_env_var(arg).map(Value::String)
            }
            _ => Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag,
                value: self.process(tagged.value)?,
            }))),
        }
    }
}

fn tag_argument<'v>(tag: &str, value: &'v Value) -> ConfigResult<&'v str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: tag.to_string(),
        reason: "argument must be a string".to_string(),
    })
}

/// `VAR` or `VAR default text`
fn resolve_env_var(arg: &str) -> ConfigResult<String> {
    let arg = arg.trim();
    let (var, default) = match arg.split_once(char::is_whitespace) {
        Some((var, default)) => (var, Some(default.trim())),
        None => (arg, None),
    };

    match (std::env::var(var), default) {
        (Ok(value), _) => {
            debug!("Substituted env var: {}", var);
            Ok(value)
        }
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: var.to_string(),
        }),
    }
}

/// Load a YAML file, reading secrets from the file's directory
pub fn load_yaml(path: impl Into<PathBuf>) -> ConfigResult<Value> {
    let path = path.into();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    YamlLoader::new(&dir)?.load_file(&path)
}

//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The processed document does not match the configuration schema
    #[error("invalid configuration structure: {0}")]
    Schema(#[source] serde_yaml::Error),

    /// Secret not found
    #[error("secret '{key}' not found in secrets.yaml")]
    SecretNotFound { key: String },

    /// Environment variable not set and no default given
    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// Configuration validation failed
    #[error("configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

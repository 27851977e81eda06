//! Error types for the Immich client

use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Failures talking to the Immich server
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, timeout, TLS failure
    #[error("error communicating with Immich: {0}")]
    Communication(#[source] reqwest::Error),

    /// Any status the endpoint does not define as success
    #[error("unexpected HTTP {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    /// The API key was rejected
    #[error("invalid API key")]
    InvalidAuth,

    /// The body could not be parsed
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Errors worth retrying on the next poll
    pub fn is_transient(&self) -> bool {
        !matches!(self, ClientError::InvalidAuth)
    }
}

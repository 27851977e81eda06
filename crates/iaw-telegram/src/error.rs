//! Error types for the media relay

use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Why a relay request, or one of its chunks, failed
///
/// Items skipped by size policy are not errors; they are counted in
/// [`RelayReport::skipped`](crate::RelayReport::skipped).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Neither the request nor the configuration carries a bot token
    #[error("no bot token provided; set telegram_bot_token or pass bot_token with the request")]
    NoToken,

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Telegram answered `ok: false`; code and description are verbatim
    #[error("Telegram API error ({}): {description}", display_code(.code))]
    Provider {
        code: Option<i64>,
        description: String,
    },

    #[error("error communicating with Telegram: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid item {index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

fn display_code(code: &Option<i64>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl RelayError {
    /// Provider error code, when Telegram supplied one
    pub fn code(&self) -> Option<i64> {
        match self {
            RelayError::Provider { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether Telegram refused a previously issued file id
    pub fn is_stale_file_id(&self) -> bool {
        match self {
            RelayError::Provider { description, .. } => {
                let description = description.to_lowercase();
                STALE_FILE_ID_MARKERS
                    .iter()
                    .any(|marker| description.contains(marker))
            }
            _ => false,
        }
    }
}

const STALE_FILE_ID_MARKERS: &[&str] = &[
    "file identifier",
    "file_id",
    "file id",
    "file reference",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(description: &str) -> RelayError {
        RelayError::Provider {
            code: Some(400),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_stale_file_id_detection() {
        assert!(provider("Bad Request: wrong file identifier/HTTP URL specified").is_stale_file_id());
        assert!(provider("Bad Request: wrong remote file identifier specified").is_stale_file_id());
        assert!(provider("Bad Request: FILE_REFERENCE_EXPIRED").is_stale_file_id());
        assert!(!provider("Bad Request: chat not found").is_stale_file_id());
        assert!(!provider("Too Many Requests: retry after 5").is_stale_file_id());
        assert!(!RelayError::NoToken.is_stale_file_id());
    }
}

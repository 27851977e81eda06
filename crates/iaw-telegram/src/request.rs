//! Relay requests and their outcome

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::MediaKind;
use crate::error::RelayError;

pub const DEFAULT_PARSE_MODE: &str = "HTML";
/// Telegram caps media groups at ten items
pub const MAX_GROUP_SIZE: usize = 10;
pub const MIN_GROUP_SIZE: usize = 2;
pub const MAX_CHUNK_DELAY_MS: u64 = 60_000;
/// Sent when a request carries neither items nor a caption
pub const DEFAULT_MESSAGE_TEXT: &str = "Notification from Immich Album Watcher";

/// One media item to relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn photo(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Photo,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
        }
    }
}

/// What to do with a photo Telegram would refuse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizedPhotoPolicy {
    #[default]
    Skip,
    /// Send the original bytes with sendDocument after the chunk's group
    SendAsDocument,
    /// Re-encode as a smaller JPEG; skip if that fails
    Downsize,
}

/// A request to republish media to one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub chat_id: String,
    /// Falls back to the configured `telegram_bot_token`
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default, alias = "urls")]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message_id: Option<i64>,
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default)]
    pub disable_web_page_preview: Option<bool>,
    #[serde(default = "default_max_group_size")]
    pub max_group_size: usize,
    /// Milliseconds to wait between chunks
    #[serde(default)]
    pub chunk_delay: u64,
    /// Items whose downloaded size exceeds this many bytes are skipped
    #[serde(default)]
    pub max_asset_data_size: Option<usize>,
    #[serde(default)]
    pub oversized_photo_policy: OversizedPhotoPolicy,
    #[serde(default = "default_wait_for_response")]
    pub wait_for_response: bool,
}

fn default_parse_mode() -> String {
    DEFAULT_PARSE_MODE.to_string()
}

fn default_max_group_size() -> usize {
    MAX_GROUP_SIZE
}

fn default_wait_for_response() -> bool {
    true
}

impl RelayRequest {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            bot_token: None,
            items: Vec::new(),
            caption: None,
            reply_to_message_id: None,
            parse_mode: default_parse_mode(),
            disable_web_page_preview: None,
            max_group_size: MAX_GROUP_SIZE,
            chunk_delay: 0,
            max_asset_data_size: None,
            oversized_photo_policy: OversizedPhotoPolicy::default(),
            wait_for_response: true,
        }
    }

    pub fn with_items(mut self, items: Vec<MediaItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Group size clamped to what Telegram accepts
    pub fn group_size(&self) -> usize {
        self.max_group_size.clamp(MIN_GROUP_SIZE, MAX_GROUP_SIZE)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay.min(MAX_CHUNK_DELAY_MS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Sent,
    /// Accepted for background delivery; the outcome is only logged
    Queued,
    Failed,
}

/// Outcome of one relay request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    pub success: bool,
    pub status: RelayStatus,
    /// Ids of every message sent, in send order, including those sent
    /// before a failure
    #[serde(default)]
    pub message_ids: Vec<i64>,
    /// Chunks that delivered at least one message
    #[serde(default)]
    pub chunks_sent: usize,
    /// Items dropped by size policy
    #[serde(default)]
    pub skipped: usize,
    /// 1-based index of the chunk that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at_chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

/// Running totals while a request is being sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Progress {
    pub message_ids: Vec<i64>,
    pub chunks_sent: usize,
    pub skipped: usize,
}

impl RelayReport {
    pub fn queued() -> Self {
        Self {
            success: true,
            status: RelayStatus::Queued,
            message_ids: Vec::new(),
            chunks_sent: 0,
            skipped: 0,
            failed_at_chunk: None,
            error: None,
            error_code: None,
        }
    }

    pub(crate) fn sent(progress: Progress) -> Self {
        Self {
            success: true,
            status: RelayStatus::Sent,
            message_ids: progress.message_ids,
            chunks_sent: progress.chunks_sent,
            skipped: progress.skipped,
            failed_at_chunk: None,
            error: None,
            error_code: None,
        }
    }

    pub(crate) fn failed(error: &RelayError, failed_at_chunk: Option<usize>, progress: Progress) -> Self {
        let description = match error {
            RelayError::Provider { description, .. } => description.clone(),
            other => other.to_string(),
        };
        Self {
            success: false,
            status: RelayStatus::Failed,
            message_ids: progress.message_ids,
            chunks_sent: progress.chunks_sent,
            skipped: progress.skipped,
            failed_at_chunk,
            error: Some(description),
            error_code: error.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_from_json() {
        let request: RelayRequest = serde_json::from_value(json!({
            "chat_id": "-100123",
            "urls": [
                {"url": "http://a/1.jpg"},
                {"url": "http://a/2.mp4", "type": "video"},
            ],
        }))
        .unwrap();

        assert_eq!(request.items[0].kind, MediaKind::Photo);
        assert_eq!(request.items[1].kind, MediaKind::Video);
        assert_eq!(request.parse_mode, "HTML");
        assert_eq!(request.max_group_size, 10);
        assert_eq!(request.oversized_photo_policy, OversizedPhotoPolicy::Skip);
        assert!(request.wait_for_response);
    }

    #[test]
    fn test_group_size_and_delay_clamped() {
        let mut request = RelayRequest::new("1");
        request.max_group_size = 1;
        assert_eq!(request.group_size(), 2);
        request.max_group_size = 50;
        assert_eq!(request.group_size(), 10);

        request.chunk_delay = 120_000;
        assert_eq!(request.chunk_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_failed_report_keeps_provider_fields_verbatim() {
        let error = RelayError::Provider {
            code: Some(413),
            description: "Request Entity Too Large".to_string(),
        };
        let progress = Progress {
            message_ids: vec![1, 2],
            chunks_sent: 1,
            skipped: 0,
        };
        let report = RelayReport::failed(&error, Some(2), progress);

        assert!(!report.success);
        assert_eq!(report.status, RelayStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("Request Entity Too Large"));
        assert_eq!(report.error_code, Some(413));
        assert_eq!(report.failed_at_chunk, Some(2));
        assert_eq!(report.message_ids, vec![1, 2]);
    }

    #[test]
    fn test_queued_report_shape() {
        let value = serde_json::to_value(RelayReport::queued()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["status"], "queued");
        assert!(value.get("error").is_none());
    }
}

//! The Telegram Bot API seam

use crate::error::RelayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of one relayed item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaKind {
    #[default]
    Photo,
    Video,
    /// Anything else a caller sent; rejected before any I/O
    Unsupported(String),
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Unsupported(other) => other.as_str(),
        }
    }

    /// Upload file extension and content type
    pub(crate) fn upload_format(&self) -> (&'static str, &'static str) {
        match self {
            MediaKind::Video => ("mp4", "video/mp4"),
            _ => ("jpg", "image/jpeg"),
        }
    }
}

impl From<String> for MediaKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "photo" => MediaKind::Photo,
            "video" => MediaKind::Video,
            _ => MediaKind::Unsupported(value),
        }
    }
}

impl From<MediaKind> for String {
    fn from(kind: MediaKind) -> Self {
        kind.as_str().to_string()
    }
}

/// File bytes sent as a multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

/// Where Telegram gets the media from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Upload(Upload),
    /// A file id Telegram returned for an earlier upload
    FileId(String),
}

impl MediaSource {
    pub fn len(&self) -> usize {
        match self {
            MediaSource::Upload(upload) => upload.bytes.len(),
            MediaSource::FileId(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chat and formatting shared by every call of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTarget {
    pub token: String,
    pub chat_id: String,
    pub parse_mode: String,
}

/// Caption and reply target; set only on the first item of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extras {
    pub caption: Option<String>,
    pub reply_to_message_id: Option<i64>,
}

/// One entry of a media group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMedia {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub caption: Option<String>,
}

/// What Telegram reported for one sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    /// Reusable id of the attached photo, video or document
    pub file_id: Option<String>,
}

/// Bot API calls, one HTTP request each
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(
        &self,
        target: &MessageTarget,
        text: &str,
        reply_to_message_id: Option<i64>,
        disable_web_page_preview: Option<bool>,
    ) -> RelayResult<SentMessage>;

    async fn send_photo(
        &self,
        target: &MessageTarget,
        photo: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage>;

    async fn send_video(
        &self,
        target: &MessageTarget,
        video: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage>;

    async fn send_document(
        &self,
        target: &MessageTarget,
        document: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage>;

    /// Messages come back in the order of `media`
    async fn send_media_group(
        &self,
        target: &MessageTarget,
        media: Vec<GroupMedia>,
        reply_to_message_id: Option<i64>,
    ) -> RelayResult<Vec<SentMessage>>;
}

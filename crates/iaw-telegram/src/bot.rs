//! Telegram Bot API over HTTP

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::api::{Extras, GroupMedia, MediaSource, MessageTarget, SentMessage, TelegramApi, Upload};
use crate::error::{RelayError, RelayResult};

/// Public Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Uploads of large videos are slow; this bounds a single call
pub const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Response envelope shared by every Bot API method
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    /// Every resolution Telegram generated, smallest first
    #[serde(default)]
    photo: Vec<FileRef>,
    video: Option<FileRef>,
    document: Option<FileRef>,
}

impl From<Message> for SentMessage {
    fn from(message: Message) -> Self {
        let file_id = message
            .photo
            .into_iter()
            .last()
            .or(message.video)
            .or(message.document)
            .map(|file| file.file_id);
        SentMessage {
            message_id: message.message_id,
            file_id,
        }
    }
}

/// [`TelegramApi`] backed by reqwest
#[derive(Debug, Clone)]
pub struct BotApiClient {
    client: Client,
    base_url: String,
}

impl BotApiClient {
    pub fn new() -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .map_err(RelayError::Transport)?;
        Ok(Self::with_client(client, TELEGRAM_API_BASE))
    }

    /// Use a prepared client against another endpoint
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> RelayResult<T> {
        let response = request.send().await.map_err(RelayError::Transport)?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(RelayError::Transport)?;
        debug!(method, status = status.as_u16(), ok = envelope.ok, "Telegram API response");

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } if status.is_success() => Ok(result),
            Envelope {
                error_code,
                description,
                ..
            } => Err(RelayError::Provider {
                code: error_code,
                description: description.unwrap_or_else(|| "Unknown Telegram error".to_string()),
            }),
        }
    }

    async fn send_media(
        &self,
        target: &MessageTarget,
        method: &str,
        field: &str,
        source: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        let mut form = Form::new()
            .text("chat_id", target.chat_id.clone())
            .text("parse_mode", target.parse_mode.clone());
        if let Some(caption) = &extras.caption {
            form = form.text("caption", caption.clone());
        }
        if let Some(reply_to) = extras.reply_to_message_id {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }
        form = match source {
            MediaSource::FileId(file_id) => form.text(field.to_string(), file_id),
            MediaSource::Upload(upload) => form.part(field.to_string(), upload_part(upload)?),
        };

        let request = self
            .client
            .post(self.method_url(&target.token, method))
            .multipart(form);
        let message: Message = self.call(method, request).await?;
        Ok(message.into())
    }
}

fn upload_part(upload: Upload) -> RelayResult<Part> {
    Part::bytes(upload.bytes)
        .file_name(upload.filename)
        .mime_str(upload.content_type)
        .map_err(RelayError::Transport)
}

#[async_trait]
impl TelegramApi for BotApiClient {
    async fn send_message(
        &self,
        target: &MessageTarget,
        text: &str,
        reply_to_message_id: Option<i64>,
        disable_web_page_preview: Option<bool>,
    ) -> RelayResult<SentMessage> {
        let mut payload = json!({
            "chat_id": target.chat_id,
            "text": text,
            "parse_mode": target.parse_mode,
        });
        if let Some(reply_to) = reply_to_message_id {
            payload["reply_to_message_id"] = reply_to.into();
        }
        if let Some(disable) = disable_web_page_preview {
            payload["disable_web_page_preview"] = disable.into();
        }

        let request = self
            .client
            .post(self.method_url(&target.token, "sendMessage"))
            .json(&payload);
        let message: Message = self.call("sendMessage", request).await?;
        Ok(message.into())
    }

    async fn send_photo(
        &self,
        target: &MessageTarget,
        photo: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.send_media(target, "sendPhoto", "photo", photo, extras)
            .await
    }

    async fn send_video(
        &self,
        target: &MessageTarget,
        video: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.send_media(target, "sendVideo", "video", video, extras)
            .await
    }

    async fn send_document(
        &self,
        target: &MessageTarget,
        document: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.send_media(target, "sendDocument", "document", document, extras)
            .await
    }

    async fn send_media_group(
        &self,
        target: &MessageTarget,
        media: Vec<GroupMedia>,
        reply_to_message_id: Option<i64>,
    ) -> RelayResult<Vec<SentMessage>> {
        let mut form = Form::new().text("chat_id", target.chat_id.clone());
        if let Some(reply_to) = reply_to_message_id {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }

        let mut entries = Vec::with_capacity(media.len());
        for (index, item) in media.into_iter().enumerate() {
            let reference = match item.source {
                MediaSource::FileId(file_id) => file_id,
                MediaSource::Upload(upload) => {
                    let name = format!("file{index}");
                    form = form.part(name.clone(), upload_part(upload)?);
                    format!("attach://{name}")
                }
            };
            let mut entry = json!({"type": item.kind.as_str(), "media": reference});
            if let Some(caption) = item.caption {
                entry["caption"] = caption.into();
                entry["parse_mode"] = target.parse_mode.clone().into();
            }
            entries.push(entry);
        }
        form = form.text("media", Value::Array(entries).to_string());

        let request = self
            .client
            .post(self.method_url(&target.token, "sendMediaGroup"))
            .multipart(form);
        let messages: Vec<Message> = self.call("sendMediaGroup", request).await?;
        Ok(messages.into_iter().map(SentMessage::from).collect())
    }
}

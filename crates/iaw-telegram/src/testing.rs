//! In-process Telegram, downloader and inspector used by relay tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{Extras, GroupMedia, MediaSource, MessageTarget, SentMessage, TelegramApi};
use crate::download::MediaDownloader;
use crate::error::{RelayError, RelayResult};
use crate::inspect::{ImageInspector, PhotoLimits};

/// A single-media call as the fake saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// `upload:<filename>` or `file_id:<id>`
    pub source: String,
    pub caption: Option<String>,
    pub reply_to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub kind: String,
    pub source: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Message {
        text: String,
        reply_to: Option<i64>,
        disable_preview: Option<bool>,
    },
    Photo(Sent),
    Video(Sent),
    Document(Sent),
    Group {
        items: Vec<GroupEntry>,
        reply_to: Option<i64>,
    },
}

fn describe(source: &MediaSource) -> String {
    match source {
        MediaSource::Upload(upload) => format!("upload:{}", upload.filename),
        MediaSource::FileId(id) => format!("file_id:{id}"),
    }
}

#[derive(Default)]
pub struct FakeTelegram {
    calls: Mutex<Vec<Call>>,
    tokens: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Vec<u8>>>,
    failing: Mutex<HashSet<usize>>,
    reject_file_ids: Mutex<bool>,
    next_id: AtomicUsize,
}

impl FakeTelegram {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn uploaded_bytes(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }

    /// Make the `n`th call (0-based) fail
    pub fn fail_call(&self, n: usize) {
        self.failing.lock().unwrap().insert(n);
    }

    pub fn reject_file_ids(&self) {
        *self.reject_file_ids.lock().unwrap() = true;
    }

    /// Record `call` and decide whether it succeeds
    fn record(&self, target: &MessageTarget, call: Call, sources: &[&MediaSource]) -> RelayResult<()> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len() - 1
        };
        self.tokens.lock().unwrap().push(target.token.clone());

        let rejects_ids = *self.reject_file_ids.lock().unwrap();
        if rejects_ids && sources.iter().any(|s| matches!(s, MediaSource::FileId(_))) {
            return Err(RelayError::Provider {
                code: Some(400),
                description: "Bad Request: wrong file identifier".to_string(),
            });
        }
        if self.failing.lock().unwrap().contains(&index) {
            return Err(RelayError::Provider {
                code: Some(400),
                description: "Bad Request: group rejected".to_string(),
            });
        }

        let mut uploads = self.uploads.lock().unwrap();
        for source in sources {
            if let MediaSource::Upload(upload) = source {
                uploads.push(upload.bytes.clone());
            }
        }
        Ok(())
    }

    fn message(&self, source: Option<&MediaSource>) -> SentMessage {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        SentMessage {
            message_id,
            file_id: source.map(|_| format!("fid-{message_id}")),
        }
    }

    fn single(
        &self,
        target: &MessageTarget,
        wrap: fn(Sent) -> Call,
        source: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        let call = wrap(Sent {
            source: describe(&source),
            caption: extras.caption.clone(),
            reply_to: extras.reply_to_message_id,
        });
        self.record(target, call, &[&source])?;
        Ok(self.message(Some(&source)))
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn send_message(
        &self,
        target: &MessageTarget,
        text: &str,
        reply_to_message_id: Option<i64>,
        disable_web_page_preview: Option<bool>,
    ) -> RelayResult<SentMessage> {
        let call = Call::Message {
            text: text.to_string(),
            reply_to: reply_to_message_id,
            disable_preview: disable_web_page_preview,
        };
        self.record(target, call, &[])?;
        Ok(self.message(None))
    }

    async fn send_photo(
        &self,
        target: &MessageTarget,
        photo: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.single(target, Call::Photo, photo, extras)
    }

    async fn send_video(
        &self,
        target: &MessageTarget,
        video: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.single(target, Call::Video, video, extras)
    }

    async fn send_document(
        &self,
        target: &MessageTarget,
        document: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        self.single(target, Call::Document, document, extras)
    }

    async fn send_media_group(
        &self,
        target: &MessageTarget,
        media: Vec<GroupMedia>,
        reply_to_message_id: Option<i64>,
    ) -> RelayResult<Vec<SentMessage>> {
        let items = media
            .iter()
            .map(|m| GroupEntry {
                kind: m.kind.as_str().to_string(),
                source: describe(&m.source),
                caption: m.caption.clone(),
            })
            .collect();
        let sources: Vec<&MediaSource> = media.iter().map(|m| &m.source).collect();
        self.record(
            target,
            Call::Group {
                items,
                reply_to: reply_to_message_id,
            },
            &sources,
        )?;
        Ok(media.iter().map(|m| self.message(Some(&m.source))).collect())
    }
}

/// Serves registered URLs; anything else is a 404
#[derive(Default)]
pub struct FakeDownloader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl FakeDownloader {
    pub fn serve(&self, url: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, url: &str) -> RelayResult<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RelayError::Download {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
    }
}

/// Bytes starting with `BIG` measure 8000x4000; only `BIG-OK` can be
/// downsized, to `small`
pub struct FakeInspector;

impl ImageInspector for FakeInspector {
    fn measure(&self, data: &[u8]) -> Option<(u32, u32)> {
        if data.starts_with(b"BIG") {
            Some((8000, 4000))
        } else {
            Some((100, 100))
        }
    }

    fn reencode(&self, data: &[u8], _limits: &PhotoLimits) -> Option<Vec<u8>> {
        data.starts_with(b"BIG-OK").then(|| b"small".to_vec())
    }
}

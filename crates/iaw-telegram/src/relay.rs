//! The media relay pipeline
//!
//! A request is split into chunks of at most `max_group_size` items, sent
//! strictly in order. Inside a chunk every item is prepared concurrently
//! (cache lookup, download, size policy) and the results are consumed in
//! input order:
//!
//! - nothing left: the chunk is skipped
//! - one media item: sendPhoto / sendVideo
//! - several: sendMediaGroup
//! - photos diverted by [`OversizedPhotoPolicy::SendAsDocument`] follow the
//!   chunk's group as individual sendDocument calls
//!
//! The caption and reply target belong to the first item of the first chunk
//! that survives the size policy, whichever way it is sent.

use futures::future::join_all;
use iaw_config::WatcherConfig;
use iaw_storage::TelegramFileCache;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{Extras, GroupMedia, MediaKind, MediaSource, MessageTarget, SentMessage, TelegramApi, Upload};
use crate::bot::BotApiClient;
use crate::download::{HttpDownloader, MediaDownloader};
use crate::error::{RelayError, RelayResult};
use crate::inspect::{ImageCrateInspector, ImageInspector, PhotoLimits};
use crate::request::{
    MediaItem, OversizedPhotoPolicy, Progress, RelayReport, RelayRequest, DEFAULT_MESSAGE_TEXT,
};

const DOCUMENT_KIND: &str = "document";

/// An item ready for sendPhoto, sendVideo or a media group
#[derive(Debug)]
struct Ready {
    url: String,
    kind: MediaKind,
    source: MediaSource,
}

/// A photo diverted to sendDocument
#[derive(Debug)]
struct Diverted {
    url: String,
    source: MediaSource,
    extras: Extras,
}

#[derive(Debug)]
enum Prepared {
    Ready(Ready),
    Document(Diverted),
    Skipped,
}

/// What one chunk delivered
#[derive(Debug, Default)]
struct ChunkOutcome {
    message_ids: Vec<i64>,
    skipped: usize,
}

/// A failed chunk attempt
#[derive(Debug)]
struct Attempt {
    error: RelayError,
    /// Whether the failed call referenced cached file ids
    used_cache: bool,
}

impl Attempt {
    fn fresh(error: RelayError) -> Self {
        Self {
            error,
            used_cache: false,
        }
    }
}

fn is_cached(source: &MediaSource) -> bool {
    matches!(source, MediaSource::FileId(_))
}

/// Republishes media URLs to Telegram chats
pub struct MediaRelay {
    api: Arc<dyn TelegramApi>,
    downloader: Arc<dyn MediaDownloader>,
    inspector: Arc<dyn ImageInspector>,
    default_token: Option<String>,
    cache: Option<Arc<TelegramFileCache>>,
    limits: PhotoLimits,
}

impl MediaRelay {
    pub fn new(
        api: Arc<dyn TelegramApi>,
        downloader: Arc<dyn MediaDownloader>,
        inspector: Arc<dyn ImageInspector>,
    ) -> Self {
        Self {
            api,
            downloader,
            inspector,
            default_token: None,
            cache: None,
            limits: PhotoLimits::default(),
        }
    }

    /// Real HTTP clients and the `image` crate inspector
    pub fn from_config(config: &WatcherConfig) -> RelayResult<Self> {
        let relay = Self::new(
            Arc::new(BotApiClient::new()?),
            Arc::new(HttpDownloader::new()?),
            Arc::new(ImageCrateInspector),
        );
        Ok(relay.with_default_token(config.telegram_bot_token.clone()))
    }

    pub fn with_default_token(mut self, token: Option<String>) -> Self {
        self.default_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_cache(mut self, cache: Arc<TelegramFileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<TelegramFileCache>> {
        self.cache.as_ref()
    }

    pub fn with_limits(mut self, limits: PhotoLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Relay `request`, or queue it when `wait_for_response` is false
    pub async fn send(self: &Arc<Self>, request: RelayRequest) -> RelayReport {
        if request.wait_for_response {
            return self.execute(request).await;
        }

        let relay = Arc::clone(self);
        tokio::spawn(async move {
            let chat_id = request.chat_id.clone();
            let report = relay.execute(request).await;
            if report.success {
                info!(chat_id = %chat_id, messages = report.message_ids.len(), "Queued Telegram notification sent");
            } else {
                error!(
                    chat_id = %chat_id,
                    "Queued Telegram notification failed: {}",
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
        });
        RelayReport::queued()
    }

    /// Relay `request` and report what was sent
    pub async fn execute(&self, request: RelayRequest) -> RelayReport {
        let mut progress = Progress::default();
        match self.run(&request, &mut progress).await {
            Ok(()) => RelayReport::sent(progress),
            Err((error, failed_at_chunk)) => {
                error!("Telegram relay failed: {}", error);
                RelayReport::failed(&error, failed_at_chunk, progress)
            }
        }
    }

    async fn run(
        &self,
        request: &RelayRequest,
        progress: &mut Progress,
    ) -> Result<(), (RelayError, Option<usize>)> {
        let token = request
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.default_token.clone())
            .ok_or((RelayError::NoToken, None))?;
        validate(&request.items).map_err(|e| (e, None))?;

        let target = MessageTarget {
            token,
            chat_id: request.chat_id.clone(),
            parse_mode: request.parse_mode.clone(),
        };
        let caption = request.caption.clone().filter(|c| !c.is_empty());

        if request.items.is_empty() {
            let text = caption.as_deref().unwrap_or(DEFAULT_MESSAGE_TEXT);
            debug!("Sending text message to Telegram");
            let sent = self
                .api
                .send_message(
                    &target,
                    text,
                    request.reply_to_message_id,
                    request.disable_web_page_preview,
                )
                .await
                .map_err(|e| (e, None))?;
            progress.message_ids.push(sent.message_id);
            progress.chunks_sent += 1;
            return Ok(());
        }

        let group_size = request.group_size();
        let delay = request.chunk_delay();
        let chunks: Vec<&[MediaItem]> = request.items.chunks(group_size).collect();
        let total = chunks.len();
        let multi = request.items.len() > 1;
        debug!(items = request.items.len(), chunks = total, group_size, "Relaying media");

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            if chunk_index > 0 && !delay.is_zero() {
                debug!("Waiting {:?} before sending chunk {}/{}", delay, chunk_index + 1, total);
                tokio::time::sleep(delay).await;
            }

            let slot = if chunk_index == 0 {
                Extras {
                    caption: caption.clone(),
                    reply_to_message_id: request.reply_to_message_id,
                }
            } else {
                Extras::default()
            };

            let outcome = self
                .send_chunk(&target, chunk_index * group_size, chunk, request, &slot)
                .await
                .map_err(|e| {
                    error!("Telegram chunk {}/{} failed: {}", chunk_index + 1, total, e);
                    (e, multi.then_some(chunk_index + 1))
                })?;

            progress.skipped += outcome.skipped;
            if outcome.message_ids.is_empty() {
                info!("Chunk {}/{}: all {} media items skipped", chunk_index + 1, total, chunk.len());
                continue;
            }
            progress.message_ids.extend(outcome.message_ids);
            progress.chunks_sent += 1;
        }
        Ok(())
    }

    /// Send one chunk, retrying with fresh uploads if Telegram rejects a
    /// cached file id
    async fn send_chunk(
        &self,
        target: &MessageTarget,
        base: usize,
        chunk: &[MediaItem],
        request: &RelayRequest,
        slot: &Extras,
    ) -> RelayResult<ChunkOutcome> {
        let mut use_cache = self.cache.is_some();
        loop {
            match self
                .send_chunk_once(target, base, chunk, request, slot, use_cache)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(Attempt {
                    error,
                    used_cache: true,
                }) if use_cache && error.is_stale_file_id() => {
                    warn!("Telegram rejected a cached file id ({}), uploading again", error);
                    use_cache = false;
                }
                Err(attempt) => return Err(attempt.error),
            }
        }
    }

    async fn send_chunk_once(
        &self,
        target: &MessageTarget,
        base: usize,
        chunk: &[MediaItem],
        request: &RelayRequest,
        slot: &Extras,
        use_cache: bool,
    ) -> Result<ChunkOutcome, Attempt> {
        let prepared = join_all(
            chunk
                .iter()
                .enumerate()
                .map(|(offset, item)| self.prepare_item(base + offset, item, request, use_cache)),
        )
        .await;

        let mut outcome = ChunkOutcome::default();
        let mut media = Vec::new();
        let mut documents = Vec::new();
        // The reply stays with the group; the caption goes to whichever item comes first
        let mut group_extras = Extras {
            caption: None,
            reply_to_message_id: slot.reply_to_message_id,
        };
        let mut caption = slot.caption.clone();

        for result in prepared {
            match result.map_err(Attempt::fresh)? {
                Prepared::Skipped => outcome.skipped += 1,
                Prepared::Ready(ready) => {
                    if let Some(claimed) = caption.take() {
                        group_extras.caption = Some(claimed);
                    }
                    media.push(ready);
                }
                Prepared::Document(mut diverted) => {
                    if let Some(claimed) = caption.take() {
                        diverted.extras.caption = Some(claimed);
                    }
                    documents.push(diverted);
                }
            }
        }
        if media.is_empty() {
            if let Some(first) = documents.first_mut() {
                first.extras.reply_to_message_id = group_extras.reply_to_message_id;
            }
        }

        let used_cache = media.iter().any(|m| is_cached(&m.source));
        let fail = |error| Attempt { error, used_cache };

        if media.len() == 1 {
            if let Some(ready) = media.pop() {
                let url = ready.url;
                let cached = is_cached(&ready.source);
                let kind = ready.kind;
                let sent = self
                    .send_single(target, &kind, ready.source, &group_extras)
                    .await
                    .map_err(fail)?;
                if !cached {
                    self.remember(&url, &sent, kind.as_str()).await;
                }
                outcome.message_ids.push(sent.message_id);
            }
        } else if !media.is_empty() {
            let mut entries = Vec::with_capacity(media.len());
            let mut uploaded = Vec::with_capacity(media.len());
            for (position, ready) in media.into_iter().enumerate() {
                uploaded.push((!is_cached(&ready.source)).then(|| (ready.url, ready.kind.clone())));
                entries.push(GroupMedia {
                    kind: ready.kind,
                    source: ready.source,
                    caption: if position == 0 {
                        group_extras.caption.clone()
                    } else {
                        None
                    },
                });
            }

            debug!("Uploading media group of {} items to Telegram", entries.len());
            let sent = self
                .api
                .send_media_group(target, entries, group_extras.reply_to_message_id)
                .await
                .map_err(fail)?;
            for (message, upload) in sent.iter().zip(uploaded) {
                if let Some((url, kind)) = upload {
                    self.remember(&url, message, kind.as_str()).await;
                }
            }
            outcome.message_ids.extend(sent.iter().map(|m| m.message_id));
        }

        for (position, diverted) in documents.into_iter().enumerate() {
            let cached = is_cached(&diverted.source);
            debug!("Sending oversized photo {} as document", position + 1);
            match self
                .api
                .send_document(target, diverted.source, &diverted.extras)
                .await
            {
                Ok(sent) => {
                    if !cached {
                        self.remember(&diverted.url, &sent, DOCUMENT_KIND).await;
                    }
                    outcome.message_ids.push(sent.message_id);
                }
                Err(e) => error!("Failed to send oversized photo as document: {}", e),
            }
        }

        Ok(outcome)
    }

    async fn send_single(
        &self,
        target: &MessageTarget,
        kind: &MediaKind,
        source: MediaSource,
        extras: &Extras,
    ) -> RelayResult<SentMessage> {
        match kind {
            MediaKind::Video => {
                debug!("Sending single video to Telegram");
                self.api.send_video(target, source, extras).await
            }
            _ => {
                debug!("Sending single photo to Telegram");
                self.api.send_photo(target, source, extras).await
            }
        }
    }

    /// Resolve one item to a cached id, an upload, a diverted document or a skip
    async fn prepare_item(
        &self,
        index: usize,
        item: &MediaItem,
        request: &RelayRequest,
        use_cache: bool,
    ) -> RelayResult<Prepared> {
        if use_cache {
            if let Some(prepared) = self.cached(item, request).await {
                return Ok(prepared);
            }
        }

        debug!("Downloading media {} from {}", index, truncate(&item.url));
        let data = self.downloader.download(&item.url).await?;
        debug!("Downloaded media {}: {} bytes", index, data.len());

        if let Some(cap) = request.max_asset_data_size {
            if data.len() > cap {
                warn!(
                    "Media {} size ({} bytes) exceeds max_asset_data_size limit ({} bytes), skipping",
                    index,
                    data.len(),
                    cap
                );
                return Ok(Prepared::Skipped);
            }
        }

        let data = if item.kind == MediaKind::Photo {
            match self.limits.violation(&data, self.inspector.as_ref()) {
                None => data,
                Some(reason) => match request.oversized_photo_policy {
                    OversizedPhotoPolicy::Skip => {
                        warn!("Photo {} {}, skipping", index, reason);
                        return Ok(Prepared::Skipped);
                    }
                    OversizedPhotoPolicy::SendAsDocument => {
                        info!("Photo {} {}, sending as document", index, reason);
                        return Ok(Prepared::Document(Diverted {
                            url: item.url.clone(),
                            source: MediaSource::Upload(Upload {
                                bytes: data,
                                filename: format!("photo_{index}.jpg"),
                                content_type: "image/jpeg",
                            }),
                            extras: Extras::default(),
                        }));
                    }
                    OversizedPhotoPolicy::Downsize => match self.downsize(data).await {
                        Some(smaller) => {
                            info!("Photo {} {}, downsized to {} bytes", index, reason, smaller.len());
                            smaller
                        }
                        None => {
                            warn!("Photo {} {} and could not be downsized, skipping", index, reason);
                            return Ok(Prepared::Skipped);
                        }
                    },
                },
            }
        } else {
            data
        };

        let (ext, content_type) = item.kind.upload_format();
        Ok(Prepared::Ready(Ready {
            url: item.url.clone(),
            kind: item.kind.clone(),
            source: MediaSource::Upload(Upload {
                bytes: data,
                filename: format!("media_{index}.{ext}"),
                content_type,
            }),
        }))
    }

    async fn cached(&self, item: &MediaItem, request: &RelayRequest) -> Option<Prepared> {
        let hit = self.cache.as_ref()?.get(&item.url).await?;
        let source = MediaSource::FileId(hit.file_id);

        if hit.kind == item.kind.as_str() {
            debug!("Using cached Telegram file id for {}", truncate(&item.url));
            return Some(Prepared::Ready(Ready {
                url: item.url.clone(),
                kind: item.kind.clone(),
                source,
            }));
        }
        let diverts = item.kind == MediaKind::Photo
            && request.oversized_photo_policy == OversizedPhotoPolicy::SendAsDocument;
        (hit.kind == DOCUMENT_KIND && diverts).then(|| {
            debug!("Using cached Telegram document id for {}", truncate(&item.url));
            Prepared::Document(Diverted {
                url: item.url.clone(),
                source,
                extras: Extras::default(),
            })
        })
    }

    async fn downsize(&self, data: Vec<u8>) -> Option<Vec<u8>> {
        let inspector = Arc::clone(&self.inspector);
        let limits = self.limits;
        tokio::task::spawn_blocking(move || inspector.reencode(&data, &limits))
            .await
            .map_err(|e| error!("Photo downsizing task failed: {}", e))
            .ok()
            .flatten()
    }

    async fn remember(&self, url: &str, sent: &SentMessage, kind: &str) {
        let (Some(cache), Some(file_id)) = (&self.cache, &sent.file_id) else {
            return;
        };
        if let Err(e) = cache.set(url, file_id, kind).await {
            warn!("Failed to save Telegram file cache: {}", e);
        }
    }
}

/// Reject items that cannot be sent before any I/O happens
fn validate(items: &[MediaItem]) -> RelayResult<()> {
    for (index, item) in items.iter().enumerate() {
        if item.url.is_empty() {
            return Err(RelayError::InvalidItem {
                index,
                reason: "missing url".to_string(),
            });
        }
        if let MediaKind::Unsupported(kind) = &item.kind {
            return Err(RelayError::InvalidItem {
                index,
                reason: format!("invalid type '{kind}', must be 'photo' or 'video'"),
            });
        }
    }
    Ok(())
}

/// Shared-link URLs carry access keys; log only their head
fn truncate(url: &str) -> &str {
    match url.char_indices().nth(80) {
        Some((end, _)) => &url[..end],
        None => url,
    }
}

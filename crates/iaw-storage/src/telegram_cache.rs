//! Telegram file-id cache
//!
//! Telegram hands back a reusable file id for every uploaded photo, video or
//! document. Remembering it per source URL lets a later relay of the same
//! asset skip the download and upload entirely. Entries expire after a TTL;
//! expired entries are purged lazily when the cache is loaded and when they
//! are looked up.

use chrono::{DateTime, Duration, Utc};
use iaw_core::{SharedClock, DOMAIN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{Storable, Storage, StorageResult};

/// Default entry lifetime in hours
pub const DEFAULT_TELEGRAM_CACHE_TTL_HOURS: i64 = 48;

/// One cached upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub file_id: String,
    /// Send method family the id belongs to (`photo`, `video`, `document`)
    #[serde(rename = "type")]
    pub kind: String,
    pub cached_at: DateTime<Utc>,
}

/// Contents of one album's cache file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramCacheData {
    #[serde(default)]
    pub files: HashMap<String, CachedFile>,
}

impl Storable for TelegramCacheData {
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Storage key for an album's cache
pub fn telegram_cache_key(album_id: &str) -> String {
    format!("{DOMAIN}.telegram_cache.{album_id}")
}

/// Per-album map from source URL to Telegram file id
pub struct TelegramFileCache {
    storage: Storage,
    key: String,
    ttl: Duration,
    clock: SharedClock,
    data: Mutex<TelegramCacheData>,
}

impl TelegramFileCache {
    pub fn new(storage: Storage, album_id: &str, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            storage,
            key: telegram_cache_key(album_id),
            ttl,
            clock,
            data: Mutex::new(TelegramCacheData::default()),
        }
    }

    fn is_expired(&self, entry: &CachedFile, now: DateTime<Utc>) -> bool {
        now - entry.cached_at > self.ttl
    }

    /// Read the cache file, dropping expired entries
    ///
    /// Returns the number of live entries.
    pub async fn load(&self) -> StorageResult<usize> {
        let mut loaded = self
            .storage
            .load_data::<TelegramCacheData>(&self.key)
            .await?
            .unwrap_or_default();

        let now = self.clock.now();
        let before = loaded.files.len();
        loaded.files.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before - loaded.files.len();

        let mut data = self.data.lock().await;
        *data = loaded;
        if purged > 0 {
            debug!(key = %self.key, purged, "Purged expired Telegram cache entries");
            self.storage.save_data(&self.key, &*data).await?;
        }
        Ok(data.files.len())
    }

    /// Look up a live entry for `url`
    pub async fn get(&self, url: &str) -> Option<CachedFile> {
        let now = self.clock.now();
        let mut data = self.data.lock().await;

        let expired = self.is_expired(data.files.get(url)?, now);
        if expired {
            data.files.remove(url);
            return None;
        }
        data.files.get(url).cloned()
    }

    /// Remember the file id Telegram assigned to `url`
    pub async fn set(&self, url: &str, file_id: &str, kind: &str) -> StorageResult<()> {
        let mut data = self.data.lock().await;
        data.files.insert(
            url.to_string(),
            CachedFile {
                file_id: file_id.to_string(),
                kind: kind.to_string(),
                cached_at: self.clock.now(),
            },
        );
        self.storage.save_data(&self.key, &*data).await
    }

    pub async fn len(&self) -> usize {
        self.data.lock().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete the cache file
    pub async fn remove_all(&self) -> StorageResult<()> {
        self.data.lock().await.files.clear();
        self.storage.delete(&self.key).await
    }
}

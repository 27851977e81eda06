//! Persisted per-album asset-id sets
//!
//! One storage file per hub instance holds a record for every watched
//! album. The coordinator reads a record once after startup to detect
//! changes made while the service was down, and rewrites it after every
//! successful poll.

use chrono::{DateTime, Utc};
use iaw_core::{SharedClock, DOMAIN};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{Storable, Storage, StorageResult};

/// Durable record for one album
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAlbumState {
    pub asset_ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Contents of the album state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumStateData {
    #[serde(default)]
    pub albums: HashMap<String, PersistedAlbumState>,
}

impl Storable for AlbumStateData {
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Storage key for a hub instance
pub fn album_state_key(entry_id: &str) -> String {
    format!("{DOMAIN}.{entry_id}")
}

/// Load/save access to persisted album state
///
/// The in-memory copy sits behind an async mutex that is held across the
/// file write, so saves from different album coordinators are serialized.
pub struct AlbumStateStore {
    storage: Storage,
    key: String,
    clock: SharedClock,
    data: Mutex<AlbumStateData>,
}

impl AlbumStateStore {
    pub fn new(storage: Storage, entry_id: &str, clock: SharedClock) -> Self {
        Self {
            storage,
            key: album_state_key(entry_id),
            clock,
            data: Mutex::new(AlbumStateData::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the state file; a missing file means no albums are recorded
    ///
    /// Returns the number of albums with a persisted record.
    pub async fn load(&self) -> StorageResult<usize> {
        let loaded = self
            .storage
            .load_data::<AlbumStateData>(&self.key)
            .await?
            .unwrap_or_default();
        let count = loaded.albums.len();

        *self.data.lock().await = loaded;
        debug!(key = %self.key, albums = count, "Loaded album state");
        Ok(count)
    }

    /// Persisted asset ids for an album, if any were recorded
    pub async fn get(&self, album_id: &str) -> Option<HashSet<String>> {
        self.data
            .lock()
            .await
            .albums
            .get(album_id)
            .map(|state| state.asset_ids.iter().cloned().collect())
    }

    /// Time of the last save for an album
    pub async fn last_updated(&self, album_id: &str) -> Option<DateTime<Utc>> {
        self.data
            .lock()
            .await
            .albums
            .get(album_id)
            .map(|state| state.last_updated)
    }

    /// Record the asset ids seen in a successful poll
    pub async fn save(&self, album_id: &str, asset_ids: &HashSet<String>) -> StorageResult<()> {
        let mut ids: Vec<String> = asset_ids.iter().cloned().collect();
        ids.sort();

        let mut data = self.data.lock().await;
        data.albums.insert(
            album_id.to_string(),
            PersistedAlbumState {
                asset_ids: ids,
                last_updated: self.clock.now(),
            },
        );
        self.storage.save_data(&self.key, &*data).await
    }

    /// Drop an album's record
    pub async fn remove(&self, album_id: &str) -> StorageResult<()> {
        let mut data = self.data.lock().await;
        if data.albums.remove(album_id).is_some() {
            self.storage.save_data(&self.key, &*data).await?;
        }
        Ok(())
    }

    /// Delete the whole state file
    pub async fn remove_all(&self) -> StorageResult<()> {
        let mut data = self.data.lock().await;
        data.albums.clear();
        self.storage.delete(&self.key).await
    }
}

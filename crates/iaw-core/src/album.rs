//! Album snapshots
//!
//! An [`AlbumSnapshot`] is the full state of one album at one poll instant.
//! It is rebuilt from scratch on every poll; only `has_new_assets` and
//! `last_change_time` are touched after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::asset::{AssetKind, AssetRecord};
use crate::payload::RawAlbum;

/// Name used when the server omits `albumName`
pub const DEFAULT_ALBUM_NAME: &str = "Unnamed";
/// Owner name used when the album carries no owner object
pub const DEFAULT_OWNER_NAME: &str = "Unknown";

/// The state of one album at one poll instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumSnapshot {
    pub id: String,
    pub name: String,
    pub asset_count: u64,
    pub photo_count: u64,
    pub video_count: u64,
    pub created_at: String,
    pub updated_at: String,
    pub shared: bool,
    pub owner: String,
    pub thumbnail_asset_id: Option<String>,
    pub asset_ids: HashSet<String>,
    pub assets: HashMap<String, AssetRecord>,
    pub people: BTreeSet<String>,
    pub has_new_assets: bool,
    pub last_change_time: Option<DateTime<Utc>>,
}

impl AlbumSnapshot {
    /// Build a snapshot from a raw album payload
    ///
    /// Assets repeated in the payload are kept once (first occurrence wins).
    /// Photos and videos are tallied by their type tag; other kinds only
    /// contribute to `asset_count`. The reported `assetCount` is trusted
    /// unless it is lower than what the asset list itself proves.
    pub fn build(raw: &RawAlbum, users: &HashMap<String, String>) -> Self {
        let mut asset_ids = HashSet::with_capacity(raw.assets.len());
        let mut assets = HashMap::with_capacity(raw.assets.len());
        let mut people = BTreeSet::new();
        let mut photo_count = 0u64;
        let mut video_count = 0u64;

        for raw_asset in &raw.assets {
            if !asset_ids.insert(raw_asset.id.clone()) {
                continue;
            }

            let record = AssetRecord::from_raw(raw_asset, users);
            match record.kind {
                AssetKind::Photo => photo_count += 1,
                AssetKind::Video => video_count += 1,
                AssetKind::Other(_) => {}
            }
            people.extend(record.people.iter().cloned());
            assets.insert(record.id.clone(), record);
        }

        let listed = asset_ids.len() as u64;
        let asset_count = raw
            .asset_count
            .unwrap_or(listed)
            .max(photo_count + video_count);

        let owner = raw
            .owner
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| DEFAULT_OWNER_NAME.to_string());

        Self {
            id: raw.id.clone(),
            name: raw
                .album_name
                .clone()
                .unwrap_or_else(|| DEFAULT_ALBUM_NAME.to_string()),
            asset_count,
            photo_count,
            video_count,
            created_at: raw.created_at.clone().unwrap_or_default(),
            updated_at: raw.updated_at.clone().unwrap_or_default(),
            shared: raw.shared.unwrap_or(false),
            owner,
            thumbnail_asset_id: raw.album_thumbnail_asset_id.clone(),
            asset_ids,
            assets,
            people,
            has_new_assets: false,
            last_change_time: None,
        }
    }

    pub fn asset(&self, id: &str) -> Option<&AssetRecord> {
        self.assets.get(id)
    }

    /// Whether the album contains no assets
    pub fn is_empty(&self) -> bool {
        self.asset_ids.is_empty()
    }

    /// Mark a detected change at `at`
    pub fn mark_changed(&mut self, added_count: usize, at: DateTime<Utc>) {
        self.has_new_assets = added_count > 0;
        self.last_change_time = Some(at);
    }

    /// Reset the new-assets flag and its timestamp
    pub fn clear_new_assets(&mut self) {
        self.has_new_assets = false;
        self.last_change_time = None;
    }
}

/// Build a snapshot from a raw album payload
pub fn build_snapshot(raw: &RawAlbum, users: &HashMap<String, String>) -> AlbumSnapshot {
    AlbumSnapshot::build(raw, users)
}

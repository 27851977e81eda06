//! Asset records built from one poll response

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::clock::parse_timestamp;
use crate::payload::RawAsset;

/// Immich type tag for photos
pub const ASSET_TYPE_IMAGE: &str = "IMAGE";
/// Immich type tag for videos
pub const ASSET_TYPE_VIDEO: &str = "VIDEO";

/// Kind of an asset, keyed on the Immich type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetKind {
    Photo,
    Video,
    /// Any other tag (e.g. `AUDIO`, `OTHER`); counted in totals only
    Other(String),
}

impl AssetKind {
    /// Map an Immich type tag by exact equality
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            ASSET_TYPE_IMAGE => AssetKind::Photo,
            ASSET_TYPE_VIDEO => AssetKind::Video,
            other => AssetKind::Other(other.to_string()),
        }
    }

    /// The Immich type tag
    pub fn as_tag(&self) -> &str {
        match self {
            AssetKind::Photo => ASSET_TYPE_IMAGE,
            AssetKind::Video => ASSET_TYPE_VIDEO,
            AssetKind::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for AssetKind {
    fn from(tag: String) -> Self {
        AssetKind::from_tag(&tag)
    }
}

impl From<AssetKind> for String {
    fn from(kind: AssetKind) -> Self {
        kind.as_tag().to_string()
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// One photo or video as seen in a single poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub kind: AssetKind,
    pub filename: String,
    /// Raw upstream value; see [`AssetRecord::created_at_parsed`]
    pub created_at: String,
    pub owner_id: String,
    pub owner_name: String,
    pub description: String,
    pub people: Vec<String>,
    pub is_favorite: bool,
    /// 1 to 5, absent when unrated or out of range
    pub rating: Option<u8>,
}

impl AssetRecord {
    /// Build a record from the raw API entry
    ///
    /// `users` resolves the owner id to a display name; unresolved owners
    /// get an empty name.
    pub fn from_raw(raw: &RawAsset, users: &HashMap<String, String>) -> Self {
        let owner_id = raw.owner_id.clone().unwrap_or_default();
        let owner_name = users.get(&owner_id).cloned().unwrap_or_default();

        let people = raw
            .people
            .iter()
            .filter_map(|p| p.name.as_deref())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        let exif = raw.exif_info.as_ref().and_then(|v| v.as_object());
        let description = exif
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .unwrap_or_default()
            .to_string();
        let rating = exif
            .and_then(|e| e.get("rating"))
            .and_then(|r| r.as_i64())
            .filter(|r| (1..=5).contains(r))
            .map(|r| r as u8);

        Self {
            id: raw.id.clone(),
            kind: AssetKind::from_tag(raw.kind.as_deref().unwrap_or(ASSET_TYPE_IMAGE)),
            filename: raw.original_file_name.clone().unwrap_or_default(),
            created_at: raw.file_created_at.clone().unwrap_or_default(),
            owner_id,
            owner_name,
            description,
            people,
            is_favorite: raw.is_favorite.unwrap_or(false),
            rating,
        }
    }

    /// Creation time, or `None` when the upstream string does not parse
    pub fn created_at_parsed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    pub fn is_photo(&self) -> bool {
        self.kind == AssetKind::Photo
    }

    pub fn is_video(&self) -> bool {
        self.kind == AssetKind::Video
    }
}

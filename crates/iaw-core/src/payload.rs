//! Raw Immich API payloads
//!
//! Field names follow the Immich REST API (camelCase). Everything that the
//! server may omit or send as `null` is optional here, and the loosely
//! structured `exifInfo` block stays an untyped JSON value so that a single
//! odd asset never aborts a whole snapshot build.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /api/albums/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlbum {
    pub id: String,
    pub album_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assets: Vec<RawAsset>,
    pub asset_count: Option<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub shared: Option<bool>,
    pub owner: Option<RawUser>,
    pub album_thumbnail_asset_id: Option<String>,
}

/// One entry of an album's `assets` list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub original_file_name: Option<String>,
    pub file_created_at: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub people: Vec<RawPerson>,
    pub exif_info: Option<Value>,
    pub is_favorite: Option<bool>,
}

/// `GET /api/users` entry, also used for an album's `owner`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `GET /api/people` entry, also embedded in assets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPerson {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// `GET /api/shared-links` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSharedLink {
    pub id: String,
    pub key: Option<String>,
    pub album: Option<RawAlbumRef>,
    pub password: Option<String>,
    pub expires_at: Option<String>,
    pub allow_download: Option<bool>,
    pub show_metadata: Option<bool>,
}

/// The album reference embedded in a shared link
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAlbumRef {
    pub id: String,
}

/// `GET /api/albums` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlbumSummary {
    pub id: String,
    pub album_name: Option<String>,
    pub asset_count: Option<u64>,
    pub shared: Option<bool>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

//! The album API seam
//!
//! The coordinator talks to Immich only through [`AlbumApi`], so polling
//! logic can be exercised against an in-process fake.

use async_trait::async_trait;
use iaw_core::payload::{RawAlbum, RawAlbumSummary, RawSharedLink};
use std::collections::HashMap;

use crate::error::ClientResult;

/// Outcome of fetching one album
#[derive(Debug, Clone)]
pub enum AlbumFetch {
    Found(RawAlbum),
    /// 404: the album was deleted or is no longer visible to this key
    NotFound,
}

/// Remote album operations, each one HTTP round-trip
#[async_trait]
pub trait AlbumApi: Send + Sync {
    /// Server URL without a trailing slash
    fn base_url(&self) -> &str;

    /// Validate the URL and API key
    async fn ping(&self) -> ClientResult<()>;

    async fn list_albums(&self) -> ClientResult<Vec<RawAlbumSummary>>;

    async fn fetch_album(&self, album_id: &str) -> ClientResult<AlbumFetch>;

    /// User id to display name
    async fn fetch_users(&self) -> ClientResult<HashMap<String, String>>;

    /// Person id to name, named people only
    async fn fetch_people(&self) -> ClientResult<HashMap<String, String>>;

    /// Every shared link visible to the key, for all albums
    async fn fetch_shared_links(&self) -> ClientResult<Vec<RawSharedLink>>;

    async fn create_shared_link(&self, album_id: &str, password: Option<&str>) -> bool;

    async fn delete_shared_link(&self, link_id: &str) -> bool;

    /// Set or clear (`None`) a link password
    async fn patch_shared_link_password(&self, link_id: &str, password: Option<&str>) -> bool;

    async fn fetch_thumbnail(&self, asset_id: &str) -> ClientResult<Vec<u8>>;
}

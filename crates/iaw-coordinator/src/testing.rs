//! In-process album server used by coordinator and hub tests

use async_trait::async_trait;
use iaw_client::{AlbumApi, AlbumFetch, ClientError, ClientResult};
use iaw_core::payload::{RawAlbum, RawAlbumRef, RawAlbumSummary, RawAsset, RawSharedLink};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// What the fake answers for an album
#[derive(Debug, Clone)]
pub enum FakeAlbum {
    Found(RawAlbum),
    NotFound,
    Failing,
}

/// Pauses `fetch_album` until released, to hold a poll in flight
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeApi {
    albums: Mutex<HashMap<String, FakeAlbum>>,
    links: Mutex<Vec<RawSharedLink>>,
    users: HashMap<String, String>,
    gate: Mutex<Option<std::sync::Arc<Gate>>>,
    pub album_fetches: AtomicUsize,
    pub thumbnail_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert("u1".to_string(), "Alice".to_string());
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn set_album(&self, album_id: &str, album: FakeAlbum) {
        self.albums.lock().unwrap().insert(album_id.to_string(), album);
    }

    pub fn set_assets(&self, album_id: &str, name: &str, ids: &[&str]) {
        self.set_album(album_id, FakeAlbum::Found(raw_album(album_id, name, ids)));
    }

    pub fn add_link(&self, album_id: &str, link_id: &str, key: &str, password: Option<&str>) {
        self.links.lock().unwrap().push(RawSharedLink {
            id: link_id.to_string(),
            key: Some(key.to_string()),
            album: Some(RawAlbumRef {
                id: album_id.to_string(),
            }),
            password: password.map(str::to_string),
            ..Default::default()
        });
    }

    pub fn link_password(&self, link_id: &str) -> Option<String> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == link_id)
            .and_then(|l| l.password.clone())
    }

    pub fn install_gate(&self) -> std::sync::Arc<Gate> {
        let gate = std::sync::Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

pub fn raw_album(album_id: &str, name: &str, ids: &[&str]) -> RawAlbum {
    RawAlbum {
        id: album_id.to_string(),
        album_name: Some(name.to_string()),
        assets: ids
            .iter()
            .map(|id| RawAsset {
                id: id.to_string(),
                kind: Some("IMAGE".to_string()),
                original_file_name: Some(format!("{id}.jpg")),
                owner_id: Some("u1".to_string()),
                ..Default::default()
            })
            .collect(),
        shared: Some(false),
        album_thumbnail_asset_id: ids.first().map(|id| id.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl AlbumApi for FakeApi {
    fn base_url(&self) -> &str {
        "http://immich.test"
    }

    async fn ping(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn list_albums(&self) -> ClientResult<Vec<RawAlbumSummary>> {
        let albums = self.albums.lock().unwrap();
        Ok(albums
            .iter()
            .filter(|(_, album)| matches!(album, FakeAlbum::Found(_)))
            .map(|(id, _)| RawAlbumSummary {
                id: id.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn fetch_album(&self, album_id: &str) -> ClientResult<AlbumFetch> {
        self.album_fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let album = self.albums.lock().unwrap().get(album_id).cloned();
        match album {
            Some(FakeAlbum::Found(raw)) => Ok(AlbumFetch::Found(raw)),
            Some(FakeAlbum::Failing) => Err(ClientError::UnexpectedStatus {
                endpoint: format!("/api/albums/{album_id}"),
                status: 500,
            }),
            Some(FakeAlbum::NotFound) | None => Ok(AlbumFetch::NotFound),
        }
    }

    async fn fetch_users(&self) -> ClientResult<HashMap<String, String>> {
        Ok(self.users.clone())
    }

    async fn fetch_people(&self) -> ClientResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn fetch_shared_links(&self) -> ClientResult<Vec<RawSharedLink>> {
        Ok(self.links.lock().unwrap().clone())
    }

    async fn create_shared_link(&self, album_id: &str, password: Option<&str>) -> bool {
        let count = self.links.lock().unwrap().len();
        self.add_link(album_id, &format!("link-{count}"), &format!("key-{count}"), password);
        true
    }

    async fn delete_shared_link(&self, link_id: &str) -> bool {
        let mut links = self.links.lock().unwrap();
        let before = links.len();
        links.retain(|l| l.id != link_id);
        links.len() != before
    }

    async fn patch_shared_link_password(&self, link_id: &str, password: Option<&str>) -> bool {
        let mut links = self.links.lock().unwrap();
        match links.iter_mut().find(|l| l.id == link_id) {
            Some(link) => {
                link.password = password.map(str::to_string);
                true
            }
            None => false,
        }
    }

    async fn fetch_thumbnail(&self, asset_id: &str) -> ClientResult<Vec<u8>> {
        self.thumbnail_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(asset_id.as_bytes().to_vec())
    }
}

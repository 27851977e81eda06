//! Core types for Immich Album Watcher
//!
//! This crate holds everything that does not touch the network or disk:
//! raw API payloads, asset records and album snapshots, the diff engine that
//! classifies album changes, shared-link URL resolution, the notification
//! payloads published on the event bus, and the injectable clock.

mod album;
mod asset;
mod clock;
mod context;
mod diff;
mod event;
pub mod payload;
mod shared_link;

pub use album::{build_snapshot, AlbumSnapshot, DEFAULT_ALBUM_NAME, DEFAULT_OWNER_NAME};
pub use asset::{AssetKind, AssetRecord, ASSET_TYPE_IMAGE, ASSET_TYPE_VIDEO};
pub use clock::{parse_timestamp, Clock, MockClock, SharedClock, SystemClock};
pub use context::Context;
pub use diff::{
    diff, diff_against_persisted_ids, AlbumChange, ChangeKind, UnknownChangeKind, ValueChange,
};
pub use event::{Event, EventData, EventType};
pub use shared_link::{links_for_album, LinkResolver, SharedLinkInfo, SharedLinkRecord};

/// Integration domain, also the prefix of every event type and storage key
pub const DOMAIN: &str = "immich_album_watcher";

/// Notification events published by album coordinators
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Fired for every detected change
    pub const ALBUM_CHANGED: &str = "immich_album_watcher_album_changed";

    /// Fired alongside ALBUM_CHANGED when assets were added
    pub const ASSETS_ADDED: &str = "immich_album_watcher_assets_added";

    /// Fired alongside ALBUM_CHANGED when assets were removed
    pub const ASSETS_REMOVED: &str = "immich_album_watcher_assets_removed";

    /// Fired alongside ALBUM_CHANGED when the album name changed
    pub const ALBUM_RENAMED: &str = "immich_album_watcher_album_renamed";

    /// Fired alongside ALBUM_CHANGED when the shared flag flipped
    pub const ALBUM_SHARING_CHANGED: &str = "immich_album_watcher_album_sharing_changed";

    /// Fired once when a previously seen album starts returning 404
    pub const ALBUM_DELETED: &str = "immich_album_watcher_album_deleted";

    /// One added asset as published in change notifications
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AssetDetail {
        pub id: String,
        pub asset_type: AssetKind,
        pub asset_filename: String,
        pub asset_created: String,
        pub asset_owner: String,
        pub asset_owner_id: String,
        pub asset_description: String,
        pub people: Vec<String>,
        pub asset_is_favorite: bool,
        pub asset_rating: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub asset_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub asset_download_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub asset_playback_url: Option<String>,
    }

    impl AssetDetail {
        /// Describe an asset, attaching share URLs when a usable link exists
        pub fn new(asset: &AssetRecord, links: &LinkResolver<'_>) -> Self {
            Self {
                id: asset.id.clone(),
                asset_type: asset.kind.clone(),
                asset_filename: asset.filename.clone(),
                asset_created: asset.created_at.clone(),
                asset_owner: asset.owner_name.clone(),
                asset_owner_id: asset.owner_id.clone(),
                asset_description: asset.description.clone(),
                people: asset.people.clone(),
                asset_is_favorite: asset.is_favorite,
                asset_rating: asset.rating,
                asset_url: links.asset_public_url(&asset.id),
                asset_download_url: links.asset_download_url(&asset.id),
                asset_playback_url: if asset.is_video() {
                    links.asset_playback_url(&asset.id)
                } else {
                    None
                },
            }
        }
    }

    /// Payload shared by ALBUM_CHANGED and the specific change events
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AlbumChangedData {
        pub hub_name: String,
        pub album_id: String,
        pub album_name: String,
        pub change_type: ChangeKind,
        pub added_count: usize,
        pub removed_count: usize,
        pub added_assets: Vec<AssetDetail>,
        pub removed_assets: Vec<String>,
        pub people: Vec<String>,
        pub shared: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub old_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub new_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub old_shared: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub new_shared: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub album_url: Option<String>,
    }

    impl AlbumChangedData {
        pub fn new(
            hub_name: &str,
            change: &AlbumChange,
            album: &AlbumSnapshot,
            links: &LinkResolver<'_>,
        ) -> Self {
            Self {
                hub_name: hub_name.to_string(),
                album_id: change.album_id.clone(),
                album_name: change.album_name.clone(),
                change_type: change.kind,
                added_count: change.added_count,
                removed_count: change.removed_count,
                added_assets: change
                    .added_assets
                    .iter()
                    .map(|asset| AssetDetail::new(asset, links))
                    .collect(),
                removed_assets: change.removed_asset_ids.clone(),
                people: album.people.iter().cloned().collect(),
                shared: album.shared,
                old_name: change.renamed.as_ref().map(|r| r.old.clone()),
                new_name: change.renamed.as_ref().map(|r| r.new.clone()),
                old_shared: change.sharing.as_ref().map(|s| s.old),
                new_shared: change.sharing.as_ref().map(|s| s.new),
                album_url: links.any_url(),
            }
        }

        /// Event types to fire for this change, ALBUM_CHANGED first
        pub fn event_types(&self) -> Vec<&'static str> {
            let mut types = vec![ALBUM_CHANGED];
            if self.added_count > 0 {
                types.push(ASSETS_ADDED);
            }
            if self.removed_count > 0 {
                types.push(ASSETS_REMOVED);
            }
            if self.old_name.is_some() {
                types.push(ALBUM_RENAMED);
            }
            if self.old_shared.is_some() {
                types.push(ALBUM_SHARING_CHANGED);
            }
            types
        }
    }

    impl EventData for AlbumChangedData {
        fn event_type() -> &'static str {
            ALBUM_CHANGED
        }
    }

    /// Data for ALBUM_DELETED events
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AlbumDeletedData {
        pub hub_name: String,
        pub album_id: String,
        pub album_name: String,
    }

    impl EventData for AlbumDeletedData {
        fn event_type() -> &'static str {
            ALBUM_DELETED
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::payload::{RawAlbum, RawAsset};
        use chrono::Utc;
        use std::collections::HashMap;

        fn album(name: &str, ids: &[(&str, &str)]) -> AlbumSnapshot {
            build_snapshot(
                &RawAlbum {
                    id: "album-1".into(),
                    album_name: Some(name.into()),
                    assets: ids
                        .iter()
                        .map(|(id, kind)| RawAsset {
                            id: id.to_string(),
                            kind: Some(kind.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                },
                &HashMap::new(),
            )
        }

        fn public_link() -> SharedLinkRecord {
            SharedLinkRecord {
                id: "l1".into(),
                key: "k1".into(),
                has_password: false,
                password: None,
                expires_at: None,
                allow_download: true,
                show_metadata: true,
            }
        }

        #[test]
        fn test_payload_carries_urls() {
            let old = album("Trip", &[("a", "IMAGE")]);
            let new = album("Trip", &[("a", "IMAGE"), ("b", "VIDEO")]);
            let change = diff(&old, &new).unwrap();
            let links = vec![public_link()];
            let resolver = LinkResolver::new("http://immich", &links, Utc::now());

            let data = AlbumChangedData::new("Immich", &change, &new, &resolver);
            assert_eq!(data.change_type, ChangeKind::AssetsAdded);
            assert_eq!(data.album_url.as_deref(), Some("http://immich/share/k1"));
            assert_eq!(data.added_assets.len(), 1);

            let detail = &data.added_assets[0];
            assert_eq!(detail.asset_type, AssetKind::Video);
            assert_eq!(
                detail.asset_playback_url.as_deref(),
                Some("http://immich/api/assets/b/video/playback?key=k1")
            );
            assert_eq!(data.event_types(), vec![ALBUM_CHANGED, ASSETS_ADDED]);
        }

        #[test]
        fn test_payload_without_links_omits_urls() {
            let old = album("Trip", &[("a", "IMAGE")]);
            let new = album("Holiday", &[]);
            let change = diff(&old, &new).unwrap();
            let resolver = LinkResolver::new("http://immich", &[], Utc::now());

            let data = AlbumChangedData::new("Immich", &change, &new, &resolver);
            assert!(data.album_url.is_none());
            assert_eq!(data.old_name.as_deref(), Some("Trip"));
            assert_eq!(
                data.event_types(),
                vec![ALBUM_CHANGED, ASSETS_REMOVED, ALBUM_RENAMED]
            );

            let json = serde_json::to_value(&data).unwrap();
            assert_eq!(json["change_type"], "changed");
            assert!(json.get("album_url").is_none());
            assert!(json.get("old_shared").is_none());
        }
    }
}

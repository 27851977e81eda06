//! Change detection between album states

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::album::AlbumSnapshot;
use crate::asset::AssetRecord;

/// Classification of a detected album change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// More than one kind of signal changed at once
    Changed,
    AssetsAdded,
    AssetsRemoved,
    AlbumRenamed,
    AlbumSharingChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Changed => "changed",
            ChangeKind::AssetsAdded => "assets_added",
            ChangeKind::AssetsRemoved => "assets_removed",
            ChangeKind::AlbumRenamed => "album_renamed",
            ChangeKind::AlbumSharingChanged => "album_sharing_changed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown change kind
#[derive(Debug, Clone, Error)]
#[error("unknown change kind: {0}")]
pub struct UnknownChangeKind(pub String);

impl FromStr for ChangeKind {
    type Err = UnknownChangeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "changed" => Ok(ChangeKind::Changed),
            "assets_added" => Ok(ChangeKind::AssetsAdded),
            "assets_removed" => Ok(ChangeKind::AssetsRemoved),
            "album_renamed" => Ok(ChangeKind::AlbumRenamed),
            "album_sharing_changed" => Ok(ChangeKind::AlbumSharingChanged),
            other => Err(UnknownChangeKind(other.to_string())),
        }
    }
}

/// An old/new value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

/// The structured difference between two album states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumChange {
    pub album_id: String,
    pub album_name: String,
    pub kind: ChangeKind,
    pub added_count: usize,
    pub removed_count: usize,
    /// Sorted for stable notification payloads
    pub added_asset_ids: Vec<String>,
    /// Detail for every added id present in the new snapshot, in id order
    pub added_assets: Vec<AssetRecord>,
    /// Sorted for stable notification payloads
    pub removed_asset_ids: Vec<String>,
    pub renamed: Option<ValueChange<String>>,
    pub sharing: Option<ValueChange<bool>>,
}

impl AlbumChange {
    pub fn has_added(&self) -> bool {
        self.added_count > 0
    }

    pub fn has_removed(&self) -> bool {
        self.removed_count > 0
    }
}

/// Compare two snapshots of the same album
///
/// Returns `None` only when the asset-id sets, the name and the shared flag
/// are all unchanged. Classification is first-match:
/// rename, sharing change, additions only, removals only, then `Changed`.
pub fn diff(old: &AlbumSnapshot, new: &AlbumSnapshot) -> Option<AlbumChange> {
    let added = sorted_difference(&new.asset_ids, &old.asset_ids);
    let removed = sorted_difference(&old.asset_ids, &new.asset_ids);
    let name_changed = old.name != new.name;
    let sharing_changed = old.shared != new.shared;

    if added.is_empty() && removed.is_empty() && !name_changed && !sharing_changed {
        return None;
    }

    let assets_quiet = added.is_empty() && removed.is_empty();
    let kind = if name_changed && assets_quiet && !sharing_changed {
        ChangeKind::AlbumRenamed
    } else if sharing_changed && assets_quiet && !name_changed {
        ChangeKind::AlbumSharingChanged
    } else if !added.is_empty() && removed.is_empty() && !name_changed && !sharing_changed {
        ChangeKind::AssetsAdded
    } else if !removed.is_empty() && added.is_empty() && !name_changed && !sharing_changed {
        ChangeKind::AssetsRemoved
    } else {
        ChangeKind::Changed
    };

    Some(AlbumChange {
        album_id: new.id.clone(),
        album_name: new.name.clone(),
        kind,
        added_count: added.len(),
        removed_count: removed.len(),
        added_assets: added_detail(&added, new),
        added_asset_ids: added,
        removed_asset_ids: removed,
        renamed: name_changed.then(|| ValueChange {
            old: old.name.clone(),
            new: new.name.clone(),
        }),
        sharing: sharing_changed.then_some(ValueChange {
            old: old.shared,
            new: new.shared,
        }),
    })
}

/// Compare a persisted asset-id set against a freshly built snapshot
///
/// Used once after a restart, before any in-memory snapshot exists. Only
/// asset membership is known for the persisted side, so the result is one
/// of `AssetsAdded`, `AssetsRemoved` or `Changed`.
pub fn diff_against_persisted_ids(
    persisted: &HashSet<String>,
    new: &AlbumSnapshot,
) -> Option<AlbumChange> {
    let added = sorted_difference(&new.asset_ids, persisted);
    let removed = sorted_difference(persisted, &new.asset_ids);

    let kind = match (added.is_empty(), removed.is_empty()) {
        (true, true) => return None,
        (false, true) => ChangeKind::AssetsAdded,
        (true, false) => ChangeKind::AssetsRemoved,
        (false, false) => ChangeKind::Changed,
    };

    Some(AlbumChange {
        album_id: new.id.clone(),
        album_name: new.name.clone(),
        kind,
        added_count: added.len(),
        removed_count: removed.len(),
        added_assets: added_detail(&added, new),
        added_asset_ids: added,
        removed_asset_ids: removed,
        renamed: None,
        sharing: None,
    })
}

fn sorted_difference(left: &HashSet<String>, right: &HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = left.difference(right).cloned().collect();
    ids.sort();
    ids
}

fn added_detail(added: &[String], new: &AlbumSnapshot) -> Vec<AssetRecord> {
    added
        .iter()
        .filter_map(|id| new.asset(id).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::build_snapshot;
    use crate::payload::{RawAlbum, RawAsset};
    use std::collections::HashMap;

    fn snapshot(name: &str, shared: bool, ids: &[&str]) -> AlbumSnapshot {
        let raw = RawAlbum {
            id: "album-1".into(),
            album_name: Some(name.into()),
            shared: Some(shared),
            assets: ids
                .iter()
                .map(|id| RawAsset {
                    id: id.to_string(),
                    kind: Some("IMAGE".into()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        build_snapshot(&raw, &HashMap::new())
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        let old = snapshot("X", false, &["a", "b"]);
        let new = snapshot("X", false, &["b", "a"]);
        assert!(diff(&old, &new).is_none());
    }

    #[test]
    fn test_additions_only() {
        let old = snapshot("X", false, &["a", "b"]);
        let new = snapshot("X", false, &["a", "b", "c"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AssetsAdded);
        assert_eq!(change.added_count, 1);
        assert_eq!(change.removed_count, 0);
        assert_eq!(change.added_asset_ids, vec!["c".to_string()]);
        assert_eq!(change.added_assets.len(), 1);
        assert_eq!(change.added_assets[0].id, "c");
    }

    #[test]
    fn test_removals_only() {
        let old = snapshot("X", false, &["a", "b", "c"]);
        let new = snapshot("X", false, &["a"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AssetsRemoved);
        assert_eq!(change.removed_asset_ids, vec!["b".to_string(), "c".to_string()]);
        assert!(change.added_assets.is_empty());
    }

    #[test]
    fn test_rename_only() {
        let old = snapshot("X", false, &["a"]);
        let new = snapshot("Y", false, &["a"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AlbumRenamed);
        assert_eq!(
            change.renamed,
            Some(ValueChange {
                old: "X".to_string(),
                new: "Y".to_string()
            })
        );
        assert!(change.sharing.is_none());
    }

    #[test]
    fn test_sharing_only() {
        let old = snapshot("X", false, &["a"]);
        let new = snapshot("X", true, &["a"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AlbumSharingChanged);
        assert_eq!(change.sharing, Some(ValueChange { old: false, new: true }));
        assert!(change.renamed.is_none());
    }

    #[test]
    fn test_rename_with_addition_is_generic() {
        let old = snapshot("X", false, &["a"]);
        let new = snapshot("Y", false, &["a", "b"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::Changed);
        assert_eq!(change.added_count, 1);
        assert!(change.renamed.is_some());
    }

    #[test]
    fn test_rename_with_sharing_is_generic() {
        let old = snapshot("X", false, &["a"]);
        let new = snapshot("Y", true, &["a"]);
        assert_eq!(diff(&old, &new).unwrap().kind, ChangeKind::Changed);
    }

    #[test]
    fn test_add_and_remove_is_generic() {
        let old = snapshot("X", false, &["a", "b"]);
        let new = snapshot("X", false, &["b", "c"]);

        let change = diff(&old, &new).unwrap();
        assert_eq!(change.kind, ChangeKind::Changed);
        assert_eq!(change.added_count, 1);
        assert_eq!(change.removed_count, 1);
    }

    #[test]
    fn test_persisted_diff() {
        let new = snapshot("X", true, &["a", "b", "c"]);

        let change = diff_against_persisted_ids(&ids(&["a", "b"]), &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AssetsAdded);
        assert_eq!(change.added_asset_ids, vec!["c".to_string()]);
        assert!(change.renamed.is_none());
        assert!(change.sharing.is_none());

        let change = diff_against_persisted_ids(&ids(&["a", "b", "c", "d"]), &new).unwrap();
        assert_eq!(change.kind, ChangeKind::AssetsRemoved);

        let change = diff_against_persisted_ids(&ids(&["a", "z"]), &new).unwrap();
        assert_eq!(change.kind, ChangeKind::Changed);

        assert!(diff_against_persisted_ids(&ids(&["c", "b", "a"]), &new).is_none());
    }

    #[test]
    fn test_change_kind_round_trips_through_str() {
        for kind in [
            ChangeKind::Changed,
            ChangeKind::AssetsAdded,
            ChangeKind::AssetsRemoved,
            ChangeKind::AlbumRenamed,
            ChangeKind::AlbumSharingChanged,
        ] {
            assert_eq!(kind.as_str().parse::<ChangeKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<ChangeKind>().is_err());
    }
}

//! Filtered, ordered views over an album's assets

use chrono::{DateTime, Utc};
use iaw_core::events::AssetDetail;
use iaw_core::{AlbumSnapshot, AssetRecord, LinkResolver};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Assets returned when no limit is given
pub const DEFAULT_ASSET_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetOrder {
    #[default]
    Date,
    Rating,
    Name,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    #[default]
    All,
    Photo,
    Video,
}

impl KindFilter {
    fn matches(self, asset: &AssetRecord) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Photo => asset.is_photo(),
            KindFilter::Video => asset.is_video(),
        }
    }
}

/// Parameters of an asset listing
///
/// The default is the ten newest assets of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetQuery {
    pub limit: usize,
    pub favorite_only: bool,
    /// Unrated assets never pass a rating filter
    pub min_rating: Option<u8>,
    pub order_by: AssetOrder,
    pub order: SortDirection,
    pub kind: KindFilter,
    /// Assets whose creation time does not parse never pass a date filter
    pub min_date: Option<DateTime<Utc>>,
    pub max_date: Option<DateTime<Utc>>,
}

impl Default for AssetQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_ASSET_LIMIT,
            favorite_only: false,
            min_rating: None,
            order_by: AssetOrder::default(),
            order: SortDirection::default(),
            kind: KindFilter::default(),
            min_date: None,
            max_date: None,
        }
    }
}

impl AssetQuery {
    /// The `limit` newest assets
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn accepts(&self, asset: &AssetRecord) -> bool {
        if self.favorite_only && !asset.is_favorite {
            return false;
        }
        if let Some(min) = self.min_rating {
            if asset.rating.map_or(true, |rating| rating < min) {
                return false;
            }
        }
        if !self.kind.matches(asset) {
            return false;
        }
        if self.min_date.is_some() || self.max_date.is_some() {
            let Some(created) = asset.created_at_parsed() else {
                return false;
            };
            if self.min_date.is_some_and(|min| created < min) {
                return false;
            }
            if self.max_date.is_some_and(|max| created > max) {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &AssetRecord, b: &AssetRecord) -> Ordering {
        let primary = match self.order_by {
            AssetOrder::Date => {
                missing_last(a.created_at_parsed(), b.created_at_parsed(), self.order)
            }
            AssetOrder::Rating => missing_last(a.rating, b.rating, self.order),
            AssetOrder::Name => self
                .order
                .apply(a.filename.to_lowercase().cmp(&b.filename.to_lowercase())),
            AssetOrder::Random => Ordering::Equal,
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Absent keys sort after present ones in either direction
fn missing_last<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => direction.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One asset of a listing, with the URLs a consumer needs to show it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetView {
    #[serde(flatten)]
    pub detail: AssetDetail,
    pub thumbnail_url: String,
}

/// Apply `query` to the assets of `album`
pub fn select_assets(
    album: &AlbumSnapshot,
    query: &AssetQuery,
    links: &LinkResolver<'_>,
) -> Vec<AssetView> {
    let mut assets: Vec<&AssetRecord> = album
        .assets
        .values()
        .filter(|asset| query.accepts(asset))
        .collect();

    if query.order_by == AssetOrder::Random {
        assets.shuffle(&mut rand::thread_rng());
    } else {
        assets.sort_by(|a, b| query.compare(a, b));
    }

    assets
        .into_iter()
        .take(query.limit)
        .map(|asset| AssetView {
            detail: AssetDetail::new(asset, links),
            thumbnail_url: links.thumbnail_url(&asset.id),
        })
        .collect()
}

//! Poll coordination for Immich Album Watcher
//!
//! - [`AlbumCoordinator`]: polls one album, diffs snapshots, publishes
//!   change notifications and persists the seen asset ids
//! - [`Hub`]: the application context owning every coordinator of a server
//! - [`AssetQuery`]: filtered, ordered listings of an album's assets

mod coordinator;
mod error;
mod hub;
mod lifecycle;
mod query;

#[cfg(test)]
mod testing;

pub use coordinator::{
    AlbumCoordinator, CoordinatorSettings, ListenerId, PollOutcome, UpdateKind,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use hub::Hub;
pub use lifecycle::{InvalidTransition, PollState};
pub use query::{
    select_assets, AssetOrder, AssetQuery, AssetView, KindFilter, SortDirection,
    DEFAULT_ASSET_LIMIT,
};

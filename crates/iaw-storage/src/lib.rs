//! Persistence for Immich Album Watcher
//!
//! - [`Storage`]: versioned JSON files in a `.storage/` directory
//! - [`AlbumStateStore`]: per-album asset-id sets used for downtime change detection
//! - [`TelegramFileCache`]: TTL-bound Telegram file ids keyed by source URL

pub mod album_state;
pub mod storage;
pub mod telegram_cache;

pub use album_state::{album_state_key, AlbumStateData, AlbumStateStore, PersistedAlbumState};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
pub use telegram_cache::{
    telegram_cache_key, CachedFile, TelegramCacheData, TelegramFileCache,
    DEFAULT_TELEGRAM_CACHE_TTL_HOURS,
};

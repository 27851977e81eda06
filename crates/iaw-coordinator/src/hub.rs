//! Hub: the application context for one Immich server
//!
//! Owns the configuration, the event bus, the `.storage/` directory, the
//! album-state store, the API client and one coordinator per watched album,
//! each holding that album's Telegram file-id cache.
//! Everything that needs shared services gets them from here explicitly.

use crate::coordinator::{AlbumCoordinator, CoordinatorSettings};
use crate::error::{CoordinatorError, CoordinatorResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use iaw_client::{AlbumApi, ImmichClient};
use iaw_config::{AlbumConfig, WatcherConfig};
use iaw_core::{SharedClock, SystemClock};
use iaw_event_bus::{EventBus, SharedEventBus};
use iaw_storage::{AlbumStateStore, Storage, TelegramFileCache};
use iaw_telegram::MediaRelay;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Hub {
    config: WatcherConfig,
    settings: CoordinatorSettings,
    bus: SharedEventBus,
    storage: Storage,
    store: Arc<AlbumStateStore>,
    client: Arc<dyn AlbumApi>,
    clock: SharedClock,
    coordinators: DashMap<String, Arc<AlbumCoordinator>>,
    started: AtomicBool,
}

impl Hub {
    pub fn new(
        config: WatcherConfig,
        client: Arc<dyn AlbumApi>,
        bus: SharedEventBus,
        clock: SharedClock,
    ) -> Self {
        let storage = Storage::new(config.storage_root());
        let store = Arc::new(AlbumStateStore::new(
            storage.clone(),
            &config.entry_id,
            clock.clone(),
        ));

        Self {
            settings: CoordinatorSettings::from_config(&config),
            config,
            bus,
            storage,
            store,
            client,
            clock,
            coordinators: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Hub talking HTTP to the configured server, on the system clock
    pub fn connect(config: WatcherConfig) -> CoordinatorResult<Self> {
        let client = ImmichClient::new(&config.immich_url, &config.api_key)?;
        Ok(Self::new(
            config,
            Arc::new(client),
            Arc::new(EventBus::new()),
            Arc::new(SystemClock),
        ))
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn hub_name(&self) -> &str {
        &self.config.hub_name
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn client(&self) -> &Arc<dyn AlbumApi> {
        &self.client
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn store(&self) -> &Arc<AlbumStateStore> {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Load persisted state, build coordinators and run their first poll
    pub async fn setup(&self) -> CoordinatorResult<()> {
        let recorded = self.store.load().await?;
        info!(
            hub = %self.config.hub_name,
            albums = self.config.albums.len(),
            recorded,
            "Setting up hub"
        );

        self.check_configured_albums().await;
        for album in &self.config.albums {
            self.attach(album).await?;
        }
        Ok(())
    }

    /// Warn about configured albums the API key cannot see
    async fn check_configured_albums(&self) {
        match self.client.list_albums().await {
            Ok(albums) => {
                let visible: HashSet<&str> = albums.iter().map(|a| a.id.as_str()).collect();
                for album in &self.config.albums {
                    if !visible.contains(album.album_id.as_str()) {
                        warn!(album_id = %album.album_id, "Configured album is not visible to this API key");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list albums"),
        }
    }

    async fn attach(&self, album: &AlbumConfig) -> CoordinatorResult<Arc<AlbumCoordinator>> {
        let cache = Arc::new(TelegramFileCache::new(
            self.storage.clone(),
            &album.album_id,
            chrono::Duration::hours(self.config.telegram_cache_ttl as i64),
            self.clock.clone(),
        ));
        let coordinator = Arc::new(
            AlbumCoordinator::new(
                album,
                &self.settings,
                self.client.clone(),
                self.bus.clone(),
                self.clock.clone(),
            )
            .with_store(self.store.clone())
            .with_telegram_cache(cache.clone()),
        );

        match self.coordinators.entry(album.album_id.clone()) {
            Entry::Occupied(_) => {
                return Err(CoordinatorError::AlbumExists {
                    album_id: album.album_id.clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(coordinator.clone());
            }
        }

        match cache.load().await {
            Ok(cached) => debug!(album_id = %album.album_id, cached, "Telegram cache loaded"),
            Err(e) => warn!(
                album_id = %album.album_id,
                "Telegram cache unreadable, starting empty: {}", e
            ),
        }
        coordinator.load_persisted().await;
        coordinator.refresh().await;
        debug!(album_id = %album.album_id, "Coordinator attached");
        Ok(coordinator)
    }

    /// Start watching another album; polls it once before returning
    pub async fn add_album(&self, album: AlbumConfig) -> CoordinatorResult<Arc<AlbumCoordinator>> {
        let coordinator = self.attach(&album).await?;
        if self.started.load(Ordering::SeqCst) {
            coordinator.start();
        }
        info!(album_id = %album.album_id, "Album added");
        Ok(coordinator)
    }

    /// Stop watching an album and forget its persisted state
    pub async fn remove_album(&self, album_id: &str) -> CoordinatorResult<()> {
        let (_, coordinator) =
            self.coordinators
                .remove(album_id)
                .ok_or_else(|| CoordinatorError::AlbumNotFound {
                    album_id: album_id.to_string(),
                })?;
        coordinator.unload();
        self.store.remove(album_id).await?;
        if let Some(cache) = coordinator.telegram_cache() {
            cache.remove_all().await?;
        }
        info!(album_id, "Album removed");
        Ok(())
    }

    pub fn coordinator(&self, album_id: &str) -> Option<Arc<AlbumCoordinator>> {
        self.coordinators
            .get(album_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every coordinator, ordered by album id
    pub fn coordinators(&self) -> Vec<Arc<AlbumCoordinator>> {
        let mut all: Vec<Arc<AlbumCoordinator>> = self
            .coordinators
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.album_id().cmp(b.album_id()));
        all
    }

    pub fn album_ids(&self) -> Vec<String> {
        self.coordinators()
            .iter()
            .map(|c| c.album_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Apply a new scan interval to every album
    pub fn update_poll_interval(&self, seconds: u64) {
        for coordinator in self.coordinators() {
            coordinator.update_poll_interval(seconds);
        }
        info!(interval_secs = seconds, "Poll interval updated for all albums");
    }

    /// Spawn the poll loop of every album
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        for coordinator in self.coordinators() {
            coordinator.start();
        }
        info!(hub = %self.config.hub_name, albums = self.len(), "Hub started");
    }

    /// Unload every coordinator; persisted state is kept for the next start
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        for coordinator in self.coordinators() {
            coordinator.unload();
        }
        self.coordinators.clear();
        info!(hub = %self.config.hub_name, "Hub stopped");
    }

    /// The watched album's Telegram file-id cache
    pub fn telegram_cache(&self, album_id: &str) -> Option<Arc<TelegramFileCache>> {
        self.coordinators
            .get(album_id)
            .and_then(|entry| entry.value().telegram_cache())
    }

    /// Relay for notifications about `album_id`, sharing its file-id cache
    pub fn media_relay(&self, album_id: &str) -> CoordinatorResult<MediaRelay> {
        let cache = self
            .telegram_cache(album_id)
            .ok_or_else(|| CoordinatorError::AlbumNotFound {
                album_id: album_id.to_string(),
            })?;
        Ok(MediaRelay::from_config(&self.config)?.with_cache(cache))
    }
}

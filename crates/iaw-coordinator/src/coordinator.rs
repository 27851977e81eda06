//! Per-album poll coordinator
//!
//! One [`AlbumCoordinator`] owns one album's snapshot and shared-link list.
//! Each poll fetches the album, builds a fresh snapshot, diffs it against
//! the previous one (or, on the first poll after a restart, against the
//! persisted id set), publishes change notifications on the event bus,
//! persists the new id set and finally tells subscribed observers.
//!
//! Poll failures never escape: they are recorded as `last_update_success`
//! and `last_error` while the previous data keeps being served.

use crate::lifecycle::PollState;
use crate::query::{select_assets, AssetQuery, AssetView};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use iaw_client::{AlbumApi, AlbumFetch, ClientError};
use iaw_config::{AlbumConfig, WatcherConfig, MIN_SCAN_INTERVAL};
use iaw_core::events::{AlbumChangedData, AlbumDeletedData};
use iaw_core::{
    diff, diff_against_persisted_ids, links_for_album, AlbumChange, AlbumSnapshot, Context,
    LinkResolver, SharedClock, SharedLinkInfo, SharedLinkRecord,
};
use iaw_event_bus::SharedEventBus;
use iaw_storage::{AlbumStateStore, TelegramFileCache};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Settings shared by every coordinator of a hub
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub hub_name: String,
    pub scan_interval: Duration,
    pub new_assets_window: chrono::Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            hub_name: config.hub_name.clone(),
            scan_interval: Duration::from_secs(config.scan_interval),
            new_assets_window: chrono::Duration::seconds(config.new_assets_window as i64),
        }
    }
}

/// What changed when observers are called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// A poll fetched the album
    Refreshed,
    /// A poll failed; previous data is still served
    UpdateFailed,
    /// The album answered 404
    AlbumMissing,
    /// A shared link was created, deleted or re-protected
    LinksChanged,
    /// The new-assets flag went down
    NewAssetsCleared,
}

/// Handle returned by [`AlbumCoordinator::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type UpdateListener = Arc<dyn Fn(UpdateKind) + Send + Sync>;

/// Result of one poll attempt
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The album was fetched; carries the detected change, if any
    Refreshed(Option<AlbumChange>),
    AlbumMissing,
    /// The fetch failed; the error is kept in `last_error`
    Failed,
    /// Another poll was already running
    Coalesced,
    /// The coordinator was unloaded before the result could be applied
    Stopped,
}

#[derive(Debug)]
struct CoordinatorState {
    phase: PollState,
    snapshot: Option<AlbumSnapshot>,
    /// Ids recorded before a restart, consumed by the first successful poll
    persisted_baseline: Option<HashSet<String>>,
    shared_links: Vec<SharedLinkRecord>,
    users: HashMap<String, String>,
    last_update_success: bool,
    last_error: Option<String>,
    last_success_at: Option<DateTime<Utc>>,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            phase: PollState::Uninitialized,
            snapshot: None,
            persisted_baseline: None,
            shared_links: Vec::new(),
            users: HashMap::new(),
            last_update_success: false,
            last_error: None,
            last_success_at: None,
        }
    }
}

/// Polls one album and publishes its changes
pub struct AlbumCoordinator {
    album_id: String,
    configured_name: String,
    hub_name: String,
    new_assets_window: chrono::Duration,
    api: Arc<dyn AlbumApi>,
    store: Option<Arc<AlbumStateStore>>,
    bus: SharedEventBus,
    clock: SharedClock,
    state: RwLock<CoordinatorState>,
    /// Single-flight guard; overlapping polls are dropped, not queued
    poll_lock: Mutex<()>,
    unloaded: AtomicBool,
    running: AtomicBool,
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: broadcast::Sender<()>,
    listeners: DashMap<ListenerId, UpdateListener>,
    next_listener_id: AtomicU64,
    /// Last fetched thumbnail, keyed by asset id
    thumbnail: Mutex<Option<(String, Vec<u8>)>>,
    telegram_cache: Option<Arc<TelegramFileCache>>,
}

impl AlbumCoordinator {
    pub fn new(
        album: &AlbumConfig,
        settings: &CoordinatorSettings,
        api: Arc<dyn AlbumApi>,
        bus: SharedEventBus,
        clock: SharedClock,
    ) -> Self {
        let (interval_tx, _) = watch::channel(clamp_interval(settings.scan_interval));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            album_id: album.album_id.clone(),
            configured_name: album.display_name().to_string(),
            hub_name: settings.hub_name.clone(),
            new_assets_window: settings.new_assets_window,
            api,
            store: None,
            bus,
            clock,
            state: RwLock::new(CoordinatorState::new()),
            poll_lock: Mutex::new(()),
            unloaded: AtomicBool::new(false),
            running: AtomicBool::new(false),
            interval_tx,
            shutdown_tx,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            thumbnail: Mutex::new(None),
            telegram_cache: None,
        }
    }

    /// Persist asset ids to `store` after every successful poll
    pub fn with_store(mut self, store: Arc<AlbumStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Album's Telegram file-id cache, shared by every relay for this album
    pub fn with_telegram_cache(mut self, cache: Arc<TelegramFileCache>) -> Self {
        self.telegram_cache = Some(cache);
        self
    }

    pub fn telegram_cache(&self) -> Option<Arc<TelegramFileCache>> {
        self.telegram_cache.clone()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CoordinatorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CoordinatorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn album_id(&self) -> &str {
        &self.album_id
    }

    /// Album name from the last poll, or the configured name before that
    pub fn album_name(&self) -> String {
        self.read_state()
            .snapshot
            .as_ref()
            .map(|album| album.name.clone())
            .unwrap_or_else(|| self.configured_name.clone())
    }

    pub fn phase(&self) -> PollState {
        self.read_state().phase
    }

    /// Pick up the id set recorded before the last shutdown
    pub async fn load_persisted(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Some(ids) = store.get(&self.album_id).await {
            debug!(album_id = %self.album_id, assets = ids.len(), "Loaded persisted baseline");
            self.write_state().persisted_baseline = Some(ids);
        }
    }

    // ==================== Polling ====================

    /// Run one poll now
    ///
    /// Returns [`PollOutcome::Coalesced`] without doing anything if another
    /// poll is still in flight.
    pub async fn refresh(&self) -> PollOutcome {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            debug!(album_id = %self.album_id, "Poll already in flight, coalescing");
            return PollOutcome::Coalesced;
        };
        if self.is_unloaded() {
            return PollOutcome::Stopped;
        }

        let need_users = self.read_state().users.is_empty();
        if need_users {
            match self.api.fetch_users().await {
                Ok(users) => self.write_state().users = users,
                Err(e) => warn!(album_id = %self.album_id, error = %e, "Failed to fetch users"),
            }
        }

        match self.api.fetch_shared_links().await {
            Ok(raw) => self.write_state().shared_links = links_for_album(&raw, &self.album_id),
            Err(e) => warn!(
                album_id = %self.album_id,
                error = %e,
                "Failed to fetch shared links, keeping previous list"
            ),
        }

        let fetched = self.api.fetch_album(&self.album_id).await;
        if self.is_unloaded() {
            debug!(album_id = %self.album_id, "Unloaded during poll, discarding result");
            return PollOutcome::Stopped;
        }

        match fetched {
            Ok(AlbumFetch::Found(raw)) => {
                let album = {
                    let state = self.read_state();
                    AlbumSnapshot::build(&raw, &state.users)
                };
                self.apply_album(album).await
            }
            Ok(AlbumFetch::NotFound) => self.apply_missing(),
            Err(e) => self.apply_failure(e),
        }
    }

    /// Same as [`refresh`](Self::refresh); shares its single-flight guard
    pub async fn force_refresh(&self) -> PollOutcome {
        info!(album_id = %self.album_id, "Refresh requested");
        self.refresh().await
    }

    async fn apply_album(&self, album: AlbumSnapshot) -> PollOutcome {
        let now = self.clock.now();
        let Some(change) = self.commit_snapshot(album, now) else {
            return PollOutcome::Stopped;
        };
        if self.is_unloaded() {
            return PollOutcome::Stopped;
        }

        if let Some(change) = &change {
            info!(
                album_id = %self.album_id,
                change = %change.kind,
                added = change.added_count,
                removed = change.removed_count,
                "Album changed"
            );
            self.publish_change(change);
        }

        if let Some(store) = &self.store {
            let ids = self.current_asset_ids();
            if self.is_unloaded() {
                return PollOutcome::Stopped;
            }
            if let Err(e) = store.save(&self.album_id, &ids).await {
                warn!(album_id = %self.album_id, error = %e, "Failed to persist album state");
            }
        }

        self.notify(UpdateKind::Refreshed);
        PollOutcome::Refreshed(change)
    }

    /// Diff `album` against the baseline and make it current
    ///
    /// Returns `None` when the coordinator can no longer accept data.
    fn commit_snapshot(
        &self,
        mut album: AlbumSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Option<AlbumChange>> {
        let mut state = self.write_state();
        let phase = match state.phase.try_transition(PollState::Polling) {
            Ok(phase) => phase,
            Err(e) => {
                debug!(album_id = %self.album_id, error = %e, "Dropping poll result");
                return None;
            }
        };

        let change = match (&state.snapshot, &state.persisted_baseline) {
            (Some(previous), _) => diff(previous, &album),
            (None, Some(persisted)) => diff_against_persisted_ids(persisted, &album),
            (None, None) => None,
        };
        self.carry_new_assets(&mut album, state.snapshot.as_ref(), change.as_ref(), now);

        if state.phase != PollState::Polling {
            info!(album_id = %self.album_id, assets = album.asset_count, "Album available");
        }
        state.phase = phase;
        state.snapshot = Some(album);
        state.persisted_baseline = None;
        state.last_update_success = true;
        state.last_error = None;
        state.last_success_at = Some(now);
        Some(change)
    }

    /// Decide the new-assets flag of a fresh snapshot
    fn carry_new_assets(
        &self,
        album: &mut AlbumSnapshot,
        previous: Option<&AlbumSnapshot>,
        change: Option<&AlbumChange>,
        now: DateTime<Utc>,
    ) {
        if let Some(change) = change.filter(|c| c.added_count > 0) {
            album.mark_changed(change.added_count, now);
            return;
        }

        let pending = previous
            .filter(|p| p.has_new_assets && self.within_window(p.last_change_time, now));
        match (pending, change) {
            (Some(previous), _) => {
                album.has_new_assets = true;
                album.last_change_time = previous.last_change_time;
            }
            (None, Some(_)) => album.mark_changed(0, now),
            (None, None) => {
                album.has_new_assets = false;
                album.last_change_time = previous
                    .filter(|p| !p.has_new_assets)
                    .and_then(|p| p.last_change_time);
            }
        }
    }

    fn within_window(&self, changed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        changed_at.is_some_and(|at| now - at <= self.new_assets_window)
    }

    fn publish_change(&self, change: &AlbumChange) {
        let data = {
            let state = self.read_state();
            let Some(album) = state.snapshot.as_ref() else {
                return;
            };
            let links = LinkResolver::new(self.api.base_url(), &state.shared_links, self.clock.now());
            AlbumChangedData::new(&self.hub_name, change, album, &links)
        };

        let context = Context::new();
        for event_type in data.event_types() {
            self.bus.fire_as(event_type, &data, context.clone());
        }
    }

    fn apply_missing(&self) -> PollOutcome {
        let previous = {
            let mut state = self.write_state();
            match state.phase.try_transition(PollState::AlbumMissing) {
                Ok(phase) => state.phase = phase,
                Err(e) => {
                    debug!(album_id = %self.album_id, error = %e, "Dropping poll result");
                    return PollOutcome::Stopped;
                }
            }
            state.persisted_baseline = None;
            state.last_update_success = true;
            state.last_error = None;
            state.last_success_at = Some(self.clock.now());
            state.snapshot.take()
        };

        if let Some(previous) = previous {
            warn!(album_id = %self.album_id, "Album deleted or no longer accessible");
            self.bus.fire_typed(
                AlbumDeletedData {
                    hub_name: self.hub_name.clone(),
                    album_id: self.album_id.clone(),
                    album_name: previous.name,
                },
                Context::new(),
            );
        } else {
            debug!(album_id = %self.album_id, "Album not found");
        }

        self.notify(UpdateKind::AlbumMissing);
        PollOutcome::AlbumMissing
    }

    fn apply_failure(&self, err: ClientError) -> PollOutcome {
        if err.is_transient() {
            warn!(album_id = %self.album_id, error = %err, "Poll failed");
        } else {
            error!(album_id = %self.album_id, error = %err, "Poll failed");
        }
        {
            let mut state = self.write_state();
            state.last_update_success = false;
            state.last_error = Some(err.to_string());
        }
        self.notify(UpdateKind::UpdateFailed);
        PollOutcome::Failed
    }

    // ==================== Poll loop ====================

    /// Spawn the periodic poll loop
    ///
    /// The first tick fires one interval from now; `setup` already polled.
    pub fn start(self: &Arc<Self>) {
        if self.is_unloaded() || self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut interval_rx = self.interval_tx.subscribe();

        tokio::spawn(async move {
            let period = *interval_rx.borrow_and_update();
            let mut ticker = poll_ticker(period);
            info!(album_id = %this.album_id, interval_secs = period.as_secs(), "Poll loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.refresh().await;
                    }
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let period = *interval_rx.borrow_and_update();
                        ticker = poll_ticker(period);
                        info!(
                            album_id = %this.album_id,
                            interval_secs = period.as_secs(),
                            "Poll interval updated"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(album_id = %this.album_id, "Received shutdown signal");
                        break;
                    }
                }
            }

            this.running.store(false, Ordering::SeqCst);
            info!(album_id = %this.album_id, "Poll loop stopped");
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Change the poll interval; a running loop restarts its timer
    pub fn update_poll_interval(&self, seconds: u64) {
        let period = clamp_interval(Duration::from_secs(seconds));
        self.interval_tx.send_replace(period);
    }

    pub fn poll_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Stop polling for good
    ///
    /// A poll already in flight may finish its request but will neither
    /// publish notifications nor persist.
    pub fn unload(&self) {
        if self.unloaded.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.write_state();
            if let Ok(phase) = state.phase.try_transition(PollState::Stopped) {
                state.phase = phase;
            }
        }
        let _ = self.shutdown_tx.send(());
        self.listeners.clear();
        info!(album_id = %self.album_id, "Coordinator unloaded");
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    // ==================== Observers ====================

    /// Call `callback` after every state transition
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(UpdateKind) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    fn notify(&self, kind: UpdateKind) {
        // Collected first so a callback may unsubscribe itself
        let listeners: Vec<UpdateListener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(kind);
        }
    }

    // ==================== Read accessors ====================

    /// Copy of the current snapshot, absent while the album is missing
    pub fn current_snapshot(&self) -> Option<AlbumSnapshot> {
        self.expire_new_assets();
        self.read_state().snapshot.clone()
    }

    fn current_asset_ids(&self) -> HashSet<String> {
        self.read_state()
            .snapshot
            .as_ref()
            .map(|album| album.asset_ids.clone())
            .unwrap_or_default()
    }

    pub fn has_new_assets(&self) -> bool {
        self.expire_new_assets();
        self.read_state()
            .snapshot
            .as_ref()
            .is_some_and(|album| album.has_new_assets)
    }

    pub fn last_change_time(&self) -> Option<DateTime<Utc>> {
        self.expire_new_assets();
        self.read_state()
            .snapshot
            .as_ref()
            .and_then(|album| album.last_change_time)
    }

    /// Lower the new-assets flag once its window has passed
    fn expire_new_assets(&self) {
        let now = self.clock.now();
        let expired = {
            let mut state = self.write_state();
            match state.snapshot.as_mut() {
                Some(album)
                    if album.has_new_assets
                        && !self.within_window(album.last_change_time, now) =>
                {
                    album.clear_new_assets();
                    true
                }
                _ => false,
            }
        };
        if expired {
            debug!(album_id = %self.album_id, "New-assets window elapsed");
            self.notify(UpdateKind::NewAssetsCleared);
        }
    }

    pub fn clear_new_assets_flag(&self) {
        {
            let mut state = self.write_state();
            if let Some(album) = state.snapshot.as_mut() {
                album.clear_new_assets();
            }
        }
        self.notify(UpdateKind::NewAssetsCleared);
    }

    /// Filtered, ordered assets of the current snapshot
    pub fn recent_assets(&self, query: &AssetQuery) -> Vec<AssetView> {
        let state = self.read_state();
        let Some(album) = state.snapshot.as_ref() else {
            return Vec::new();
        };
        let links = LinkResolver::new(self.api.base_url(), &state.shared_links, self.clock.now());
        select_assets(album, query, &links)
    }

    pub fn last_update_success(&self) -> bool {
        self.read_state().last_update_success
    }

    pub fn last_error(&self) -> Option<String> {
        self.read_state().last_error.clone()
    }

    /// Whether consumers have anything to show
    ///
    /// False only before any poll succeeded and while no data is held.
    pub fn is_available(&self) -> bool {
        let state = self.read_state();
        state.snapshot.is_some() || state.last_success_at.is_some()
    }

    // ==================== Shared links ====================

    fn with_links<R>(&self, f: impl FnOnce(&LinkResolver<'_>) -> R) -> R {
        let state = self.read_state();
        let links = LinkResolver::new(self.api.base_url(), &state.shared_links, self.clock.now());
        f(&links)
    }

    pub fn shared_links(&self) -> Vec<SharedLinkRecord> {
        self.read_state().shared_links.clone()
    }

    pub fn has_unprotected_link(&self) -> bool {
        self.with_links(|l| l.has_unprotected_link())
    }

    pub fn has_protected_link(&self) -> bool {
        self.with_links(|l| l.has_protected_link())
    }

    pub fn public_url(&self) -> Option<String> {
        self.with_links(|l| l.public_url())
    }

    pub fn public_urls(&self) -> Vec<String> {
        self.with_links(|l| l.public_urls())
    }

    pub fn protected_url(&self) -> Option<String> {
        self.with_links(|l| l.protected_url())
    }

    pub fn protected_urls(&self) -> Vec<String> {
        self.with_links(|l| l.protected_urls())
    }

    /// First accessible link, else first non-expired one
    pub fn any_url(&self) -> Option<String> {
        self.with_links(|l| l.any_url())
    }

    pub fn protected_password(&self) -> Option<String> {
        self.with_links(|l| l.protected_password())
    }

    pub fn protected_link_id(&self) -> Option<String> {
        self.with_links(|l| l.protected_link_id())
    }

    pub fn unprotected_link_id(&self) -> Option<String> {
        self.with_links(|l| l.unprotected_link_id())
    }

    pub fn shared_links_info(&self) -> Vec<SharedLinkInfo> {
        self.with_links(|l| l.links_info())
    }

    pub async fn create_shared_link(&self, password: Option<&str>) -> bool {
        let password = password.filter(|p| !p.is_empty());
        let created = self.api.create_shared_link(&self.album_id, password).await;
        if created {
            info!(album_id = %self.album_id, protected = password.is_some(), "Created shared link");
            self.reload_shared_links().await;
        }
        created
    }

    pub async fn delete_shared_link(&self, link_id: &str) -> bool {
        let deleted = self.api.delete_shared_link(link_id).await;
        if deleted {
            info!(album_id = %self.album_id, link_id, "Deleted shared link");
            self.reload_shared_links().await;
        }
        deleted
    }

    /// Set, or with `None` or an empty string remove, a link's password
    pub async fn set_shared_link_password(&self, link_id: &str, password: Option<&str>) -> bool {
        let password = password.filter(|p| !p.is_empty());
        let updated = self
            .api
            .patch_shared_link_password(link_id, password)
            .await;
        if updated {
            info!(
                album_id = %self.album_id,
                link_id,
                protected = password.is_some(),
                "Updated shared link password"
            );
            self.reload_shared_links().await;
        }
        updated
    }

    async fn reload_shared_links(&self) {
        match self.api.fetch_shared_links().await {
            Ok(raw) => {
                self.write_state().shared_links = links_for_album(&raw, &self.album_id);
                self.notify(UpdateKind::LinksChanged);
            }
            Err(e) => warn!(album_id = %self.album_id, error = %e, "Failed to reload shared links"),
        }
    }

    // ==================== Thumbnail ====================

    /// Bytes of the album thumbnail
    ///
    /// The last image is cached per asset id and served again when a fetch
    /// fails.
    pub async fn fetch_thumbnail(&self) -> Option<Vec<u8>> {
        let asset_id = {
            let state = self.read_state();
            state
                .snapshot
                .as_ref()
                .and_then(|album| album.thumbnail_asset_id.clone())
        }?;

        let mut cached = self.thumbnail.lock().await;
        if let Some((cached_id, bytes)) = cached.as_ref() {
            if *cached_id == asset_id {
                return Some(bytes.clone());
            }
        }

        match self.api.fetch_thumbnail(&asset_id).await {
            Ok(bytes) => {
                *cached = Some((asset_id, bytes.clone()));
                Some(bytes)
            }
            Err(e) => {
                warn!(album_id = %self.album_id, error = %e, "Failed to fetch thumbnail");
                cached.as_ref().map(|(_, bytes)| bytes.clone())
            }
        }
    }
}

fn clamp_interval(period: Duration) -> Duration {
    period.max(Duration::from_secs(MIN_SCAN_INTERVAL))
}

fn poll_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

//! Immich Album Watcher
//!
//! Watches the configured Immich albums and logs every change notification.
//!
//! Usage: `immich-album-watcher [config.yaml]`

use anyhow::{Context as _, Result};
use iaw_config::WatcherConfig;
use iaw_coordinator::Hub;
use iaw_core::Event;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG: &str = "config.yaml";

fn describe(event: &Event) -> String {
    let field = |name: &str| {
        event
            .data
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string()
    };
    match event.data.get("added_count").and_then(|v| v.as_u64()) {
        Some(added) => {
            let removed = event
                .data
                .get("removed_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            format!("{} (+{added} -{removed})", field("album_name"))
        }
        None => field("album_id"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    info!("Starting Immich Album Watcher {}", env!("CARGO_PKG_VERSION"));

    let config = WatcherConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let hub = Hub::connect(config)?;

    hub.client()
        .ping()
        .await
        .with_context(|| format!("cannot reach Immich at {}", hub.config().immich_url))?;
    info!("Connected to Immich at {}", hub.config().immich_url);

    let mut events = hub.bus().subscribe_all();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(event_type = %event.event_type, "{}", describe(&event)),
                Err(RecvError::Lagged(missed)) => warn!("Event log lagged, {} events dropped", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    hub.setup().await?;
    hub.start();
    info!(
        hub = %hub.hub_name(),
        albums = hub.len(),
        "Immich Album Watcher is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    hub.shutdown().await;
    listener.abort();

    Ok(())
}

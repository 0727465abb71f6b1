use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use pushmon_server::app;
use pushmon_server::config::ServerConfig;
use pushmon_server::state::AppState;
use pushmon_storage::memory::{restore_snapshot, MemoryStore};
use pushmon_storage::sqlite::SqliteStore;
use pushmon_storage::MetricStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pushmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    let store = build_store(&config)?;

    // Periodic snapshot policy: writes between ticks are not durable until
    // the next flush or the final one at shutdown.
    let flusher = if config.store_interval_secs > 0
        && config.database_path.is_none()
        && !config.file_storage_path.is_empty()
    {
        let store = Arc::clone(&store);
        let period = Duration::from_secs(config.store_interval_secs as u64);
        tracing::info!(period_secs = config.store_interval_secs, "periodic snapshot flushing");
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await; // the first tick completes immediately
            loop {
                tick.tick().await;
                match store.save() {
                    Ok(()) => tracing::debug!("snapshot flushed"),
                    Err(err) => tracing::error!(error = %err, "periodic snapshot flush failed"),
                }
            }
        }))
    } else {
        None
    };

    let state = AppState {
        store: Arc::clone(&store),
        hash_key: config.key.clone().map(Arc::new),
    };

    let listener = TcpListener::bind(&config.address).await?;
    tracing::info!(address = %config.address, signed = config.key.is_some(), "pushmon-server listening");
    axum::serve(listener, app::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(flusher) = flusher {
        flusher.abort();
    }

    // Best-effort final flush; a failure is logged, never a crash.
    match store.save() {
        Ok(()) => tracing::info!("state flushed"),
        Err(err) => tracing::error!(error = %err, "final snapshot flush failed"),
    }
    Ok(())
}

fn build_store(config: &ServerConfig) -> Result<Arc<dyn MetricStore>> {
    if let Some(database_path) = config.database_path.as_deref() {
        tracing::info!(database = %database_path, "using SQLite backend");
        return Ok(Arc::new(SqliteStore::open(database_path)?));
    }

    let snapshot_path =
        (!config.file_storage_path.is_empty()).then(|| Path::new(&config.file_storage_path));
    let initial = match snapshot_path {
        Some(path) if config.restore => restore_snapshot(path),
        _ => Default::default(),
    };
    let store = MemoryStore::new(initial, config.sync_save(), snapshot_path)?;
    tracing::info!(
        snapshot = %config.file_storage_path,
        sync_save = config.sync_save(),
        restore = config.restore,
        "using in-memory backend"
    );
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "listening for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

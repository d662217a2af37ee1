use tracing::info;

use collab_store::{CollabStore, StoreConfig};

/// Hosts a collaboration store: opens it from `COLLAB_*` configuration,
/// runs the retention schedule and closes it cleanly on Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collab_daemon=debug,collab_store=debug,collab_db=info".into()),
        )
        .init();

    let config = StoreConfig::from_env()?;
    info!(
        db_path = %config.db_path.display(),
        retention_scope = ?config.retention_scope,
        thread_pointer = ?config.thread_pointer,
        "Starting collab daemon"
    );

    let store = CollabStore::open(config).await?;

    let stats = store.get_storage_stats().await?;
    info!(
        messages = stats.total_messages,
        activities = stats.total_activities,
        approx_bytes = stats.storage_used,
        last_cleanup = ?stats.last_cleanup,
        "Store ready"
    );

    store.start_retention()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    store.shutdown().await;
    Ok(())
}

//! Patchwatch Tracker - Main entry point

use anyhow::Result;
use patchwatch_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use patchwatch_tracker::{
    config::TrackerConfig, db, PgVersionRepository, ProtocolClient, VersionTracker,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Binary defaults first, LOG_* environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("patchwatch-tracker")
        .filter_directives("patchwatch_tracker=debug,sqlx=warn,hyper=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Patchwatch Tracker");

    let config = TrackerConfig::load()?;
    info!(
        upstream = %config.upstream.base_url,
        products = config.polling.products.len(),
        interval_secs = config.polling.interval_secs,
        "Configuration loaded"
    );

    let db_pool = db::create_pool(&config.database).await?;
    db::health_check(&db_pool).await?;

    let repository = PgVersionRepository::new(db_pool);
    repository.migrate().await?;
    info!("Database migrations completed");

    let client = ProtocolClient::new(&config.upstream)?;
    let tracker = VersionTracker::new(Arc::new(repository), Arc::new(client), config.polling.top_n);

    if config.polling.enabled {
        tracker
            .start_polling(config.polling.products.clone(), config.polling.interval())
            .await?;
    } else {
        info!("Polling is disabled (PATCHWATCH_POLLING_ENABLED=false)");
    }

    shutdown_signal().await;

    tracker.stop_polling().await;
    info!("Tracker shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping poller");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping poller");
        },
    }
}

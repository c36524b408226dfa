use anyhow::Context;
use hearth::config::loader::ConfigLoader;
use hearth::observability::{StoreMetrics, init_tracing};
use hearth::services::create_persistence_service;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    let _log_guard = init_tracing(&config.logging);
    info!("Starting Hearth...");
    info!("Data directory: {}", config.storage.data_dir.display());

    let metrics = StoreMetrics::default();
    let service = create_persistence_service(&config, metrics.clone());

    match service.load().await {
        Ok(report) => {
            if !report.has_profiles() {
                warn!("No emotional profiles loaded, starting with empty state");
            }
            info!(
                "Loaded {} profiles, {} DM-enabled users, {} migrated records",
                report.profiles.loaded, report.dm_enabled_users, report.migrated_records
            );
        }
        Err(e) => {
            error!("Storage unavailable: {}", e);
            return Err(e).context("storage unavailable");
        }
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    };

    let report = if config.autosave.enabled {
        service
            .run_autosave(Duration::from_secs(config.autosave.interval_secs), shutdown)
            .await?
    } else {
        shutdown.await;
        service.save().await?
    };

    if report.is_success() {
        info!("Final save complete ({} files written)", report.written);
    } else {
        warn!("Final save finished with {} failed writes", report.failed());
    }
    info!("Store metrics:\n{}", metrics.gather());

    Ok(())
}

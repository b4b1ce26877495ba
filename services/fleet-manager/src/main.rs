//! Fleet manager
//!
//! Places pending streaming instances onto data-plane clusters using the
//! strategy selected by the configured scaling mode.

use std::sync::Arc;

use anyhow::Result;
use fleet_manager::{
    config,
    db::Database,
    placement::PlacementStrategy,
    registry::{ClusterRegistry, InMemoryClusterRegistry},
    scheduler::{PlacementWorker, WorkloadQueue},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to FLEET_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        scaling_mode = ?config.dataplane.scaling_mode,
        instance_types = config.kafka.instance_types.supported_instance_types.len(),
        "Starting fleet manager"
    );

    let (registry, queue): (Arc<dyn ClusterRegistry>, Arc<dyn WorkloadQueue>) =
        match &config.database {
            Some(db_config) => {
                let db = match Database::connect(db_config).await {
                    Ok(db) => db,
                    Err(e) => {
                        error!(error = %e, "Failed to connect to database");
                        return Err(e.into());
                    }
                };

                if config.dev_mode {
                    info!("Running database migrations (dev mode)");
                    if let Err(e) = db.run_migrations().await {
                        error!(error = %e, "Failed to run migrations");
                        return Err(e.into());
                    }
                }

                db.health_check().await?;
                let registry: Arc<dyn ClusterRegistry> = Arc::new(db.cluster_registry());
                let queue: Arc<dyn WorkloadQueue> = Arc::new(db.workload_queue());
                (registry, queue)
            }
            None => {
                warn!("DATABASE_URL not set, using in-memory registry");
                let memory = Arc::new(InMemoryClusterRegistry::new());
                let registry: Arc<dyn ClusterRegistry> = memory.clone();
                let queue: Arc<dyn WorkloadQueue> = memory;
                (registry, queue)
            }
        };

    let strategy = PlacementStrategy::from_config(registry, &config.dataplane, &config.kafka);
    info!(strategy = strategy.name(), "Placement strategy selected");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = PlacementWorker::new(
        strategy,
        queue,
        Arc::new(config.kafka.instance_types.clone()),
        config.placement_interval,
    );
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Placement worker did not shut down in time");
    }

    info!("Fleet manager shutdown complete");
    Ok(())
}

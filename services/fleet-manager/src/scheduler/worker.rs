//! Placement background worker.
//!
//! Runs placement passes over the workload queue on a periodic interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::WorkloadQueue;
use crate::capacity::InstanceTypeCatalog;
use crate::cluster::KafkaRequest;
use crate::error::ServiceResult;
use crate::placement::PlacementStrategy;

/// Workloads fetched per pass.
const BATCH_SIZE: usize = 100;

/// Outcome of a single placement pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlacementStats {
    pub processed: i32,
    pub assigned: i32,
    pub unschedulable: i32,
    pub failed: i32,
}

/// Worker that drains the workload queue into clusters.
pub struct PlacementWorker {
    strategy: PlacementStrategy,
    queue: Arc<dyn WorkloadQueue>,
    catalog: Arc<InstanceTypeCatalog>,
    interval: Duration,
}

impl PlacementWorker {
    pub fn new(
        strategy: PlacementStrategy,
        queue: Arc<dyn WorkloadQueue>,
        catalog: Arc<InstanceTypeCatalog>,
        interval: Duration,
    ) -> Self {
        Self {
            strategy,
            queue,
            catalog,
            interval,
        }
    }

    /// Run the placement worker until shutdown is signaled.
    #[instrument(skip(self, shutdown), fields(strategy = self.strategy.name()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting placement worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_pass().await {
                        Ok(stats) if stats.processed > 0 => info!(
                            processed = stats.processed,
                            assigned = stats.assigned,
                            unschedulable = stats.unschedulable,
                            failed = stats.failed,
                            "Placement pass complete"
                        ),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Placement pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Placement worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single placement pass.
    ///
    /// Only listing the queue fails the pass; a failure on one workload is
    /// counted and the pass moves on.
    pub async fn run_pass(&self) -> ServiceResult<PlacementStats> {
        let pending = self.queue.list_unassigned(BATCH_SIZE).await?;
        let mut stats = PlacementStats::default();

        for kafka in &pending {
            stats.processed += 1;
            match self.place(kafka).await {
                Ok(true) => stats.assigned += 1,
                Ok(false) => stats.unschedulable += 1,
                Err(e) => {
                    warn!(kafka_id = %kafka.id, error = %e, "Failed to place workload");
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn place(&self, kafka: &KafkaRequest) -> ServiceResult<bool> {
        let Some(cluster) = self.strategy.find_cluster(kafka).await? else {
            debug!(kafka_id = %kafka.id, "No cluster can take workload yet");
            return Ok(false);
        };

        let size = self
            .catalog
            .get_instance_size(&kafka.instance_type, &kafka.size_id)?;

        self.queue
            .assign_cluster(&kafka.id, &cluster.cluster_id, size.capacity_consumed)
            .await?;

        info!(
            kafka_id = %kafka.id,
            cluster_id = %cluster.cluster_id,
            streaming_units = size.capacity_consumed,
            "Workload placed"
        );
        Ok(true)
    }
}

//! Placement scheduling for pending streaming instances.
//!
//! The scheduler is responsible for:
//! - Reading accepted workloads that have no cluster yet
//! - Asking the active [`crate::placement::PlacementStrategy`] for a cluster
//! - Recording the assignment and the streaming units it consumes
//!
//! Workloads without a fitting cluster stay queued for the next pass.

mod worker;

use async_trait::async_trait;
use fleet_id::{ClusterId, KafkaId};

use crate::cluster::KafkaRequest;
use crate::error::ServiceResult;

pub use worker::{PlacementStats, PlacementWorker};

/// Source of workloads awaiting placement.
#[async_trait]
pub trait WorkloadQueue: Send + Sync {
    /// Oldest accepted workloads without a cluster, at most `limit`.
    async fn list_unassigned(&self, limit: usize) -> ServiceResult<Vec<KafkaRequest>>;

    /// Place a workload on a cluster and move it to `preparing`.
    async fn assign_cluster(
        &self,
        kafka_id: &KafkaId,
        cluster_id: &ClusterId,
        streaming_units: i32,
    ) -> ServiceResult<()>;
}

//! Cluster registry seam.
//!
//! The registry is the only place cluster records and workload counts come
//! from. Placement reads it; the autoscaling reconciler reads it and issues
//! the two mutations (`set_compute_nodes`, `update_status`).
//!
//! [`InMemoryClusterRegistry`] backs tests and database-less runs; the
//! Postgres implementation lives in [`crate::db`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fleet_id::{ClusterId, KafkaId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cluster::{
    Cluster, ClusterStatus, FindClusterCriteria, KafkaInstanceCount, KafkaRequest, KafkaStatus,
    StreamingUnitCount, StreamingUnitCountPerClusterList,
};
use crate::error::{ServiceError, ServiceResult};
use crate::scheduler::WorkloadQueue;

/// Lookup and mutation surface over data-plane clusters.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// First cluster matching `criteria`, if any.
    async fn find_cluster(&self, criteria: &FindClusterCriteria) -> ServiceResult<Option<Cluster>>;

    /// Every cluster matching `criteria`, in registry order.
    async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> ServiceResult<Vec<Cluster>>;

    /// Workload counts for the given clusters, in one lookup.
    ///
    /// Clusters without workloads may be absent from the result.
    async fn find_kafka_instance_count(
        &self,
        cluster_ids: &[ClusterId],
    ) -> ServiceResult<Vec<KafkaInstanceCount>>;

    /// Streaming units consumed per cluster and instance type.
    async fn find_streaming_unit_count_by_cluster_and_instance_type(
        &self,
    ) -> ServiceResult<StreamingUnitCountPerClusterList>;

    /// Request a new compute-node count for a cluster.
    async fn set_compute_nodes(&self, cluster_id: &ClusterId, nodes: i32) -> ServiceResult<()>;

    /// Persist a new lifecycle status for a cluster.
    async fn update_status(&self, cluster: &Cluster, status: ClusterStatus) -> ServiceResult<()>;

    async fn find_cluster_by_id(&self, cluster_id: &ClusterId) -> ServiceResult<Option<Cluster>>;
}

#[derive(Debug, Clone)]
struct WorkloadRecord {
    request: KafkaRequest,
    cluster_id: Option<ClusterId>,
    status: KafkaStatus,
    streaming_units: i32,
}

#[derive(Debug, Default)]
struct Inner {
    clusters: Vec<Cluster>,
    compute_nodes: HashMap<ClusterId, i32>,
    workloads: Vec<WorkloadRecord>,
}

/// Process-local registry.
#[derive(Debug, Default)]
pub struct InMemoryClusterRegistry {
    inner: RwLock<Inner>,
    fail_mutations: AtomicBool,
    fail_status_updates: AtomicBool,
}

impl InMemoryClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with clusters, kept in the given order.
    pub fn with_clusters(clusters: Vec<Cluster>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                clusters,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Make every subsequent mutation fail with a general error.
    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Make only cluster status writes fail with a general error.
    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    /// Record a workload already running on `cluster_id`.
    pub async fn insert_placed_workload(
        &self,
        request: KafkaRequest,
        cluster_id: ClusterId,
        streaming_units: i32,
    ) {
        self.inner.write().await.workloads.push(WorkloadRecord {
            request,
            cluster_id: Some(cluster_id),
            status: KafkaStatus::Ready,
            streaming_units,
        });
    }

    /// Queue a workload for placement.
    pub async fn enqueue(&self, request: KafkaRequest) {
        self.inner.write().await.workloads.push(WorkloadRecord {
            request,
            cluster_id: None,
            status: KafkaStatus::Accepted,
            streaming_units: 0,
        });
    }

    /// Last compute-node count requested for a cluster.
    pub async fn compute_nodes(&self, cluster_id: &ClusterId) -> Option<i32> {
        self.inner.read().await.compute_nodes.get(cluster_id).copied()
    }

    /// The cluster a workload was placed on.
    pub async fn assigned_cluster(&self, kafka_id: &KafkaId) -> Option<ClusterId> {
        self.inner
            .read()
            .await
            .workloads
            .iter()
            .find(|w| &w.request.id == kafka_id)
            .and_then(|w| w.cluster_id.clone())
    }

    fn check_mutations(&self) -> ServiceResult<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(ServiceError::general("registry unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterRegistry for InMemoryClusterRegistry {
    async fn find_cluster(&self, criteria: &FindClusterCriteria) -> ServiceResult<Option<Cluster>> {
        let inner = self.inner.read().await;
        Ok(inner.clusters.iter().find(|c| criteria.matches(c)).cloned())
    }

    async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> ServiceResult<Vec<Cluster>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clusters
            .iter()
            .filter(|c| criteria.matches(c))
            .cloned()
            .collect())
    }

    async fn find_kafka_instance_count(
        &self,
        cluster_ids: &[ClusterId],
    ) -> ServiceResult<Vec<KafkaInstanceCount>> {
        let inner = self.inner.read().await;
        let mut counts: Vec<KafkaInstanceCount> = Vec::new();
        for w in inner.workloads.iter().filter(|w| w.status.occupies_capacity()) {
            let Some(cluster_id) = w.cluster_id.as_ref().filter(|id| cluster_ids.contains(id)) else {
                continue;
            };
            match counts.iter_mut().find(|c| &c.cluster_id == cluster_id) {
                Some(c) => c.count += 1,
                None => counts.push(KafkaInstanceCount {
                    cluster_id: cluster_id.clone(),
                    count: 1,
                }),
            }
        }
        Ok(counts)
    }

    async fn find_streaming_unit_count_by_cluster_and_instance_type(
        &self,
    ) -> ServiceResult<StreamingUnitCountPerClusterList> {
        let inner = self.inner.read().await;
        let mut counts: Vec<StreamingUnitCount> = Vec::new();
        for w in inner.workloads.iter().filter(|w| w.status.occupies_capacity()) {
            let Some(cluster_id) = w.cluster_id.as_ref() else {
                continue;
            };
            match counts
                .iter_mut()
                .find(|c| &c.cluster_id == cluster_id && c.instance_type == w.request.instance_type)
            {
                Some(c) => c.count += w.streaming_units,
                None => counts.push(StreamingUnitCount {
                    cluster_id: cluster_id.clone(),
                    instance_type: w.request.instance_type.clone(),
                    count: w.streaming_units,
                }),
            }
        }
        Ok(StreamingUnitCountPerClusterList(counts))
    }

    async fn set_compute_nodes(&self, cluster_id: &ClusterId, nodes: i32) -> ServiceResult<()> {
        self.check_mutations()?;
        debug!(cluster_id = %cluster_id, nodes, "Recording compute node request");
        self.inner
            .write()
            .await
            .compute_nodes
            .insert(cluster_id.clone(), nodes);
        Ok(())
    }

    async fn update_status(&self, cluster: &Cluster, status: ClusterStatus) -> ServiceResult<()> {
        self.check_mutations()?;
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(ServiceError::general("cluster status store unavailable"));
        }
        let mut inner = self.inner.write().await;
        let stored = inner
            .clusters
            .iter_mut()
            .find(|c| c.cluster_id == cluster.cluster_id)
            .ok_or_else(|| ServiceError::not_found(format!("cluster {}", cluster.cluster_id)))?;
        stored.status = status;
        Ok(())
    }

    async fn find_cluster_by_id(&self, cluster_id: &ClusterId) -> ServiceResult<Option<Cluster>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clusters
            .iter()
            .find(|c| &c.cluster_id == cluster_id)
            .cloned())
    }
}

#[async_trait]
impl WorkloadQueue for InMemoryClusterRegistry {
    async fn list_unassigned(&self, limit: usize) -> ServiceResult<Vec<KafkaRequest>> {
        let inner = self.inner.read().await;
        Ok(inner
            .workloads
            .iter()
            .filter(|w| w.status == KafkaStatus::Accepted && w.cluster_id.is_none())
            .take(limit)
            .map(|w| w.request.clone())
            .collect())
    }

    async fn assign_cluster(
        &self,
        kafka_id: &KafkaId,
        cluster_id: &ClusterId,
        streaming_units: i32,
    ) -> ServiceResult<()> {
        self.check_mutations()?;
        let mut inner = self.inner.write().await;
        let record = inner
            .workloads
            .iter_mut()
            .find(|w| &w.request.id == kafka_id)
            .ok_or_else(|| ServiceError::not_found(format!("kafka request {kafka_id}")))?;
        record.cluster_id = Some(cluster_id.clone());
        record.status = KafkaStatus::Preparing;
        record.streaming_units = streaming_units;
        Ok(())
    }
}

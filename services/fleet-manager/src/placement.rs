//! Cluster placement strategies.
//!
//! A strategy picks the data-plane cluster a pending streaming instance is
//! placed on. Exactly one strategy is active per process; it is chosen from
//! the scaling mode when the fleet manager starts:
//!
//! - manual scaling: [`FirstSchedulableWithinLimit`]
//! - auto scaling: [`FirstReadyWithCapacity`]
//! - otherwise: [`FirstReadyCluster`]
//!
//! `Ok(None)` means no cluster can take the instance right now. That is a
//! normal outcome; the instance stays queued.

use std::collections::HashMap;
use std::sync::Arc;

use fleet_id::ClusterId;
use tracing::{debug, instrument};

use crate::capacity::{InstanceSize, InstanceTypeCatalog};
use crate::cluster::{Cluster, FindClusterCriteria, KafkaRequest};
use crate::config::{ClusterList, DataplaneClusterConfig, KafkaConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::registry::ClusterRegistry;

/// The active placement strategy.
pub enum PlacementStrategy {
    FirstReady(FirstReadyCluster),
    FirstSchedulableWithinLimit(FirstSchedulableWithinLimit),
    FirstReadyWithCapacity(FirstReadyWithCapacity),
}

impl PlacementStrategy {
    /// Select the strategy matching the configured scaling mode.
    pub fn from_config(
        registry: Arc<dyn ClusterRegistry>,
        dataplane: &DataplaneClusterConfig,
        kafka: &KafkaConfig,
    ) -> Self {
        let catalog = Arc::new(kafka.instance_types.clone());
        if dataplane.is_manual_scaling_enabled() {
            Self::FirstSchedulableWithinLimit(FirstSchedulableWithinLimit {
                registry,
                clusters: dataplane.cluster_config.clone(),
                catalog,
            })
        } else if dataplane.is_auto_scaling_enabled() {
            Self::FirstReadyWithCapacity(FirstReadyWithCapacity { registry, catalog })
        } else {
            Self::FirstReady(FirstReadyCluster { registry })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FirstReady(_) => "first_ready",
            Self::FirstSchedulableWithinLimit(_) => "first_schedulable_within_limit",
            Self::FirstReadyWithCapacity(_) => "first_ready_with_capacity",
        }
    }

    /// Find a cluster for `kafka`.
    #[instrument(skip(self, kafka), fields(kafka_id = %kafka.id, strategy = self.name()))]
    pub async fn find_cluster(&self, kafka: &KafkaRequest) -> ServiceResult<Option<Cluster>> {
        let found = match self {
            Self::FirstReady(s) => s.find_cluster(kafka).await,
            Self::FirstSchedulableWithinLimit(s) => s.find_cluster(kafka).await,
            Self::FirstReadyWithCapacity(s) => s.find_cluster(kafka).await,
        }?;

        match &found {
            Some(cluster) => debug!(cluster_id = %cluster.cluster_id, "Selected cluster"),
            None => debug!("No cluster available"),
        }
        Ok(found)
    }
}

fn resolve_size<'a>(
    catalog: &'a InstanceTypeCatalog,
    kafka: &KafkaRequest,
    criteria: &FindClusterCriteria,
) -> ServiceResult<&'a InstanceSize> {
    catalog
        .get_instance_size(&kafka.instance_type, &kafka.size_id)
        .map_err(|e| {
            ServiceError::not_found(format!(
                "instance plan not supported, failed to find cluster with criteria {criteria:?}: {e}"
            ))
        })
}

/// Returns the first Ready cluster matching the request.
///
/// No capacity awareness: used when cluster sizing happens elsewhere.
pub struct FirstReadyCluster {
    registry: Arc<dyn ClusterRegistry>,
}

impl FirstReadyCluster {
    pub fn new(registry: Arc<dyn ClusterRegistry>) -> Self {
        Self { registry }
    }

    pub async fn find_cluster(&self, kafka: &KafkaRequest) -> ServiceResult<Option<Cluster>> {
        self.registry.find_cluster(&kafka.placement_criteria()).await
    }
}

/// Returns the first schedulable cluster whose configured instance limit
/// still fits the request.
///
/// Candidates are tried in the order of the static cluster list, so
/// operators get a predictable fill order.
pub struct FirstSchedulableWithinLimit {
    registry: Arc<dyn ClusterRegistry>,
    clusters: ClusterList,
    catalog: Arc<InstanceTypeCatalog>,
}

impl FirstSchedulableWithinLimit {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        clusters: ClusterList,
        catalog: Arc<InstanceTypeCatalog>,
    ) -> Self {
        Self {
            registry,
            clusters,
            catalog,
        }
    }

    pub async fn find_cluster(&self, kafka: &KafkaRequest) -> ServiceResult<Option<Cluster>> {
        let criteria = kafka.placement_criteria();
        let size = resolve_size(&self.catalog, kafka, &criteria)?;

        let mut matching: HashMap<ClusterId, Cluster> = self
            .registry
            .find_all_clusters(&criteria)
            .await?
            .into_iter()
            .map(|c| (c.cluster_id.clone(), c))
            .collect();

        // Configuration order, restricted to schedulable clusters the
        // registry reported as matching.
        let candidates: Vec<ClusterId> = self
            .clusters
            .iter()
            .filter(|c| c.schedulable && matching.contains_key(&c.cluster_id))
            .map(|c| c.cluster_id.clone())
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        let counts: HashMap<ClusterId, i32> = self
            .registry
            .find_kafka_instance_count(&candidates)
            .await
            .map_err(|e| {
                ServiceError::general_with_cause(
                    format!("failed to find kafka instance count for clusters {candidates:?}"),
                    e,
                )
            })?
            .into_iter()
            .map(|c| (c.cluster_id, c.count))
            .collect();

        for cluster_id in candidates {
            let count = counts.get(&cluster_id).copied().unwrap_or(0);
            if self
                .clusters
                .is_number_of_kafka_within_cluster_limit(&cluster_id, count + size.capacity_consumed)
            {
                return Ok(matching.remove(&cluster_id));
            }
        }

        Ok(None)
    }
}

/// Returns the first Ready cluster with streaming units left for the
/// requested instance type, in registry order.
pub struct FirstReadyWithCapacity {
    registry: Arc<dyn ClusterRegistry>,
    catalog: Arc<InstanceTypeCatalog>,
}

impl FirstReadyWithCapacity {
    pub fn new(registry: Arc<dyn ClusterRegistry>, catalog: Arc<InstanceTypeCatalog>) -> Self {
        Self { registry, catalog }
    }

    pub async fn find_cluster(&self, kafka: &KafkaRequest) -> ServiceResult<Option<Cluster>> {
        let criteria = kafka.placement_criteria();
        let size = resolve_size(&self.catalog, kafka, &criteria)?;

        let clusters = self.registry.find_all_clusters(&criteria).await?;
        if clusters.is_empty() {
            return Ok(None);
        }

        let used_units = self
            .registry
            .find_streaming_unit_count_by_cluster_and_instance_type()
            .await
            .map_err(|e| {
                ServiceError::general_with_cause(
                    "failed to get count of streaming units by cluster and instance type",
                    e,
                )
            })?;

        for cluster in clusters {
            let used = used_units.streaming_unit_count_for(&cluster.cluster_id, &kafka.instance_type);

            // Malformed capacity data means the registry is inconsistent;
            // abort rather than place around it.
            let capacity = cluster.retrieve_dynamic_capacity_info().map_err(|e| {
                ServiceError::general_with_cause(
                    format!("failed to retrieve capacity information for cluster {}", cluster.cluster_id),
                    e,
                )
            })?;
            let max_units = capacity
                .get(&kafka.instance_type)
                .map(|info| info.max_units)
                .unwrap_or(0);

            if used + size.capacity_consumed <= max_units {
                return Ok(Some(cluster));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::tests::sample_catalog;
    use crate::cluster::tests::ready_cluster;
    use crate::cluster::{ClusterStatus, KafkaInstanceCount, StreamingUnitCountPerClusterList};
    use crate::config::{ManualCluster, ScalingMode};
    use crate::registry::InMemoryClusterRegistry;
    use async_trait::async_trait;
    use fleet_id::KafkaId;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(s: &str) -> ClusterId {
        ClusterId::parse(s).unwrap()
    }

    fn request(instance_type: &str, size_id: &str) -> KafkaRequest {
        KafkaRequest {
            id: KafkaId::new(),
            cloud_provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            multi_az: true,
            instance_type: instance_type.to_string(),
            size_id: size_id.to_string(),
        }
    }

    fn manual(entries: &[(&str, bool, i32)]) -> ClusterList {
        ClusterList::new(
            entries
                .iter()
                .map(|(cluster_id, schedulable, limit)| ManualCluster {
                    cluster_id: id(cluster_id),
                    provider: "aws".to_string(),
                    region: "us-east-1".to_string(),
                    multi_az: true,
                    schedulable: *schedulable,
                    kafka_instance_limit: *limit,
                })
                .collect(),
        )
        .unwrap()
    }

    fn with_capacity(cluster_id: &str, instance_type: &str, max_units: i32) -> Cluster {
        let mut info = serde_json::Map::new();
        info.insert(
            instance_type.to_string(),
            serde_json::json!({"max_nodes": 30, "max_units": max_units, "remaining_units": max_units}),
        );
        let mut c = ready_cluster(cluster_id);
        c.dynamic_capacity_info = Some(serde_json::Value::Object(info));
        c
    }

    fn within_limit(registry: Arc<InMemoryClusterRegistry>, clusters: ClusterList) -> FirstSchedulableWithinLimit {
        FirstSchedulableWithinLimit::new(registry, clusters, Arc::new(sample_catalog()))
    }

    #[tokio::test]
    async fn test_from_config_selects_strategy() {
        let registry: Arc<dyn ClusterRegistry> = Arc::new(InMemoryClusterRegistry::new());
        let kafka = KafkaConfig {
            instance_types: sample_catalog(),
        };
        let mut dataplane = DataplaneClusterConfig::default();
        assert_eq!(
            PlacementStrategy::from_config(registry.clone(), &dataplane, &kafka).name(),
            "first_ready"
        );

        dataplane.scaling_mode = ScalingMode::Manual;
        assert_eq!(
            PlacementStrategy::from_config(registry.clone(), &dataplane, &kafka).name(),
            "first_schedulable_within_limit"
        );

        dataplane.scaling_mode = ScalingMode::Auto;
        assert_eq!(
            PlacementStrategy::from_config(registry, &dataplane, &kafka).name(),
            "first_ready_with_capacity"
        );
    }

    #[tokio::test]
    async fn test_first_ready_returns_first_match() {
        let mut full = ready_cluster("full");
        full.status = ClusterStatus::Full;
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![
            full,
            ready_cluster("a"),
            ready_cluster("b"),
        ]));
        let strategy = FirstReadyCluster::new(registry);
        let found = strategy.find_cluster(&request("standard", "x1")).await.unwrap();
        assert_eq!(found.map(|c| c.cluster_id), Some(id("a")));
    }

    #[tokio::test]
    async fn test_first_ready_none_is_not_an_error() {
        let strategy = FirstReadyCluster::new(Arc::new(InMemoryClusterRegistry::new()));
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_within_limit_follows_configuration_order() {
        // Registry returns "b" first; configuration lists "a" first.
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![
            ready_cluster("b"),
            ready_cluster("a"),
        ]));
        let strategy = within_limit(registry, manual(&[("a", true, 5), ("b", true, 5)]));
        let found = strategy.find_cluster(&request("standard", "x1")).await.unwrap();
        assert_eq!(found.map(|c| c.cluster_id), Some(id("a")));
    }

    #[tokio::test]
    async fn test_within_limit_skips_unschedulable_and_full() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![
            ready_cluster("a"),
            ready_cluster("b"),
            ready_cluster("c"),
        ]));
        registry.insert_placed_workload(request("standard", "x1"), id("b"), 1).await;
        registry.insert_placed_workload(request("standard", "x1"), id("b"), 1).await;

        let strategy = within_limit(registry, manual(&[("a", false, 5), ("b", true, 2), ("c", true, 2)]));
        let found = strategy.find_cluster(&request("standard", "x1")).await.unwrap();
        assert_eq!(found.map(|c| c.cluster_id), Some(id("c")));
    }

    #[tokio::test]
    async fn test_within_limit_counts_capacity_consumed() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![ready_cluster("a")]));
        registry.insert_placed_workload(request("standard", "x1"), id("a"), 1).await;

        let strategy = within_limit(registry, manual(&[("a", true, 2)]));
        // x2 consumes two units: 1 + 2 > 2.
        assert!(strategy.find_cluster(&request("standard", "x2")).await.unwrap().is_none());
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_within_limit_unknown_size_fails() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![ready_cluster("a")]));
        let strategy = within_limit(registry, manual(&[("a", true, 2)]));
        let err = strategy.find_cluster(&request("standard", "x9")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_within_limit_no_schedulable_clusters() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![ready_cluster("a")]));
        let strategy = within_limit(registry, manual(&[("other", true, 2)]));
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_none());
    }

    /// Registry wrapper counting instance-count lookups.
    struct CountingRegistry {
        inner: InMemoryClusterRegistry,
        count_calls: AtomicUsize,
    }

    #[async_trait]
    impl ClusterRegistry for CountingRegistry {
        async fn find_cluster(&self, criteria: &FindClusterCriteria) -> ServiceResult<Option<Cluster>> {
            self.inner.find_cluster(criteria).await
        }
        async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> ServiceResult<Vec<Cluster>> {
            self.inner.find_all_clusters(criteria).await
        }
        async fn find_kafka_instance_count(
            &self,
            cluster_ids: &[ClusterId],
        ) -> ServiceResult<Vec<KafkaInstanceCount>> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_kafka_instance_count(cluster_ids).await
        }
        async fn find_streaming_unit_count_by_cluster_and_instance_type(
            &self,
        ) -> ServiceResult<StreamingUnitCountPerClusterList> {
            self.inner.find_streaming_unit_count_by_cluster_and_instance_type().await
        }
        async fn set_compute_nodes(&self, cluster_id: &ClusterId, nodes: i32) -> ServiceResult<()> {
            self.inner.set_compute_nodes(cluster_id, nodes).await
        }
        async fn update_status(&self, cluster: &Cluster, status: ClusterStatus) -> ServiceResult<()> {
            self.inner.update_status(cluster, status).await
        }
        async fn find_cluster_by_id(&self, cluster_id: &ClusterId) -> ServiceResult<Option<Cluster>> {
            self.inner.find_cluster_by_id(cluster_id).await
        }
    }

    #[tokio::test]
    async fn test_within_limit_uses_one_batched_count() {
        let registry = Arc::new(CountingRegistry {
            inner: InMemoryClusterRegistry::with_clusters(vec![
                ready_cluster("a"),
                ready_cluster("b"),
                ready_cluster("c"),
            ]),
            count_calls: AtomicUsize::new(0),
        });
        let strategy = FirstSchedulableWithinLimit::new(
            registry.clone(),
            manual(&[("a", true, 0), ("b", true, 0), ("c", true, 0)]),
            Arc::new(sample_catalog()),
        );
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_none());
        assert_eq!(registry.count_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_capacity_picks_first_with_room() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![
            with_capacity("a", "standard", 1),
            with_capacity("b", "standard", 10),
        ]));
        registry.insert_placed_workload(request("standard", "x1"), id("a"), 1).await;

        let strategy = FirstReadyWithCapacity::new(registry, Arc::new(sample_catalog()));
        let found = strategy.find_cluster(&request("standard", "x1")).await.unwrap();
        assert_eq!(found.map(|c| c.cluster_id), Some(id("b")));
    }

    #[tokio::test]
    async fn test_with_capacity_missing_instance_type_has_no_room() {
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![with_capacity(
            "a", "developer", 10,
        )]));
        let strategy = FirstReadyWithCapacity::new(registry, Arc::new(sample_catalog()));
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_capacity_malformed_info_aborts() {
        let mut broken = ready_cluster("a");
        broken.dynamic_capacity_info = Some(serde_json::json!("garbage"));
        let registry = Arc::new(InMemoryClusterRegistry::with_clusters(vec![
            broken,
            with_capacity("b", "standard", 10),
        ]));
        let strategy = FirstReadyWithCapacity::new(registry, Arc::new(sample_catalog()));
        let err = strategy.find_cluster(&request("standard", "x1")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_with_capacity_no_clusters() {
        let strategy =
            FirstReadyWithCapacity::new(Arc::new(InMemoryClusterRegistry::new()), Arc::new(sample_catalog()));
        assert!(strategy.find_cluster(&request("standard", "x1")).await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn within_limit_never_exceeds_limit(
            limits in proptest::collection::vec(0i32..6, 1..5),
            placed in proptest::collection::vec(0i32..6, 1..5),
            large in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let names: Vec<String> = (0..limits.len()).map(|i| format!("c{i}")).collect();
                let registry = Arc::new(InMemoryClusterRegistry::with_clusters(
                    names.iter().map(|n| ready_cluster(n)).collect(),
                ));
                for (name, n) in names.iter().zip(placed.iter()) {
                    for _ in 0..*n {
                        registry.insert_placed_workload(request("standard", "x1"), id(name), 1).await;
                    }
                }
                let entries: Vec<(&str, bool, i32)> = names
                    .iter()
                    .zip(limits.iter())
                    .map(|(n, l)| (n.as_str(), true, *l))
                    .collect();
                let strategy = within_limit(registry.clone(), manual(&entries));

                let size_id = if large { "x2" } else { "x1" };
                let units = if large { 2 } else { 1 };
                if let Some(cluster) = strategy.find_cluster(&request("standard", size_id)).await.unwrap() {
                    let idx = names.iter().position(|n| n == cluster.cluster_id.as_str()).unwrap();
                    let current = placed.get(idx).copied().unwrap_or(0);
                    assert!(current + units <= limits[idx]);
                }
            });
        }

        #[test]
        fn with_capacity_never_overcommits(
            max_units in proptest::collection::vec(0i32..6, 1..5),
            used in proptest::collection::vec(0i32..6, 1..5),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let names: Vec<String> = (0..max_units.len()).map(|i| format!("c{i}")).collect();
                let registry = Arc::new(InMemoryClusterRegistry::with_clusters(
                    names
                        .iter()
                        .zip(max_units.iter())
                        .map(|(n, m)| with_capacity(n, "standard", *m))
                        .collect(),
                ));
                for (name, u) in names.iter().zip(used.iter()) {
                    if *u > 0 {
                        registry.insert_placed_workload(request("standard", "x1"), id(name), *u).await;
                    }
                }
                let strategy = FirstReadyWithCapacity::new(registry, Arc::new(sample_catalog()));
                if let Some(cluster) = strategy.find_cluster(&request("standard", "x2")).await.unwrap() {
                    let idx = names.iter().position(|n| n == cluster.cluster_id.as_str()).unwrap();
                    let current = used.get(idx).copied().unwrap_or(0);
                    assert!(current + 2 <= max_units[idx]);
                }
            });
        }
    }
}

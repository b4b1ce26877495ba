//! Cloud platform client seam.
//!
//! The platform owns the authoritative compute-node target of a cluster and
//! the node count it actually observes. The reconciler only reads both to
//! tell whether a resize is still in flight.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use fleet_id::ClusterId;

/// Compute-node view of a cluster from the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformCluster {
    /// Last requested compute-node count.
    pub desired_compute_nodes: Option<i32>,

    /// Compute nodes reported by the platform's metrics.
    pub metric_compute_nodes: Option<i32>,
}

/// Platform client interface.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch the compute-node view of a cluster.
    async fn get_cluster(&self, cluster_id: &ClusterId) -> Result<PlatformCluster>;
}

/// Static platform client for tests and embedders without a platform API.
///
/// Unknown clusters are reported as fully converged at zero nodes.
#[derive(Debug, Default)]
pub struct StaticPlatformClient {
    clusters: RwLock<HashMap<ClusterId, PlatformCluster>>,
}

impl StaticPlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the view returned for a cluster.
    pub fn set(&self, cluster_id: ClusterId, cluster: PlatformCluster) {
        if let Ok(mut clusters) = self.clusters.write() {
            clusters.insert(cluster_id, cluster);
        }
    }

    /// Report a cluster whose requested and observed nodes agree.
    pub fn converged(self, cluster_id: ClusterId, nodes: i32) -> Self {
        self.set(
            cluster_id,
            PlatformCluster {
                desired_compute_nodes: Some(nodes),
                metric_compute_nodes: Some(nodes),
            },
        );
        self
    }
}

#[async_trait]
impl PlatformClient for StaticPlatformClient {
    async fn get_cluster(&self, cluster_id: &ClusterId) -> Result<PlatformCluster> {
        let clusters = self
            .clusters
            .read()
            .map_err(|_| anyhow::anyhow!("platform client state poisoned"))?;
        Ok(clusters.get(cluster_id).cloned().unwrap_or(PlatformCluster {
            desired_compute_nodes: Some(0),
            metric_compute_nodes: Some(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_client_returns_configured_view() {
        let id = ClusterId::parse("a").unwrap();
        let client = StaticPlatformClient::new().converged(id.clone(), 6);
        let view = client.get_cluster(&id).await.unwrap();
        assert_eq!(view.desired_compute_nodes, Some(6));
        assert_eq!(view.metric_compute_nodes, Some(6));
    }

    #[tokio::test]
    async fn test_static_client_unknown_cluster() {
        let client = StaticPlatformClient::new();
        let view = client.get_cluster(&ClusterId::parse("zzz").unwrap()).await.unwrap();
        assert_eq!(view.desired_compute_nodes, view.metric_compute_nodes);
    }
}

//! Autoscaling reconciler for data-plane clusters.

use std::sync::Arc;

use fleet_id::ClusterId;
use fleet_reconcile::{decide, CapacityPressure, ConvergenceStatus, NodeBounds, ScalingDecision};
use tracing::{debug, info, instrument, warn};

use super::status::DataPlaneClusterStatus;
use crate::capacity::{node_scaling_multiple, InstanceTypeCatalog, MinimumFootprint};
use crate::cluster::{Cluster, ClusterConfig, ClusterConfigObservability, ClusterStatus};
use crate::config::{DataplaneClusterConfig, KafkaConfig, ObservabilityConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::platform::PlatformClient;
use crate::registry::ClusterRegistry;

const READY_CONDITION: &str = "Ready";

/// Processes status reports from data-plane clusters.
pub struct DataPlaneClusterService {
    registry: Arc<dyn ClusterRegistry>,
    platform: Arc<dyn PlatformClient>,
    catalog: Arc<InstanceTypeCatalog>,
    autoscaling: bool,
    observability: ObservabilityConfig,
}

impl DataPlaneClusterService {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        platform: Arc<dyn PlatformClient>,
        dataplane: &DataplaneClusterConfig,
        kafka: &KafkaConfig,
        observability: ObservabilityConfig,
    ) -> Self {
        Self {
            registry,
            platform,
            catalog: Arc::new(kafka.instance_types.clone()),
            autoscaling: dataplane.is_auto_scaling_enabled(),
            observability,
        }
    }

    /// Apply one status report to a cluster.
    ///
    /// Resizes the cluster when auto scaling is enabled and no resize is in
    /// flight, then persists the derived lifecycle status. A failed resize
    /// leaves the status untouched.
    #[instrument(skip(self, report), fields(cluster_id = %cluster_id))]
    pub async fn update_status(
        &self,
        cluster_id: &ClusterId,
        report: &DataPlaneClusterStatus,
    ) -> ServiceResult<()> {
        let cluster = self
            .registry
            .find_cluster_by_id(cluster_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("cluster {cluster_id}")))?;

        if !self.cluster_can_process_status_reports(&cluster) {
            return Err(ServiceError::invalid_state(format!(
                "cluster {cluster_id} in status '{}' cannot process status reports",
                cluster.status
            )));
        }

        let operator_ready = self.is_fleet_shard_operator_ready(report)?;

        let mut scaling_up = false;
        if self.autoscaling {
            if self.compute_node_scaling_action_in_progress(&cluster).await? {
                debug!("Compute node resize in progress, skipping scaling");
                scaling_up = true;
            } else {
                let decision = self.update_cluster_nodes(&cluster, report).await?;
                scaling_up = decision.is_scale_up();
            }
        }

        self.set_cluster_status(&cluster, report, operator_ready, scaling_up)
            .await?;
        Ok(())
    }

    /// Static configuration for a known cluster.
    pub async fn get_cluster_config(&self, cluster_id: &ClusterId) -> ServiceResult<ClusterConfig> {
        self.registry
            .find_cluster_by_id(cluster_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("cluster {cluster_id}")))?;

        Ok(ClusterConfig {
            observability: ClusterConfigObservability {
                access_token: self.observability.access_token.clone(),
                channel: self.observability.channel.clone(),
                repository: self.observability.repository.clone(),
                tag: self.observability.tag.clone(),
            },
        })
    }

    pub(crate) fn cluster_can_process_status_reports(&self, cluster: &Cluster) -> bool {
        cluster.status.can_process_status_reports()
    }

    /// Readiness of the fleet-shard operator as reported in the conditions.
    pub(crate) fn is_fleet_shard_operator_ready(
        &self,
        report: &DataPlaneClusterStatus,
    ) -> ServiceResult<bool> {
        let Some(condition) = report
            .conditions
            .iter()
            .find(|c| c.condition_type == READY_CONDITION)
        else {
            return Ok(false);
        };

        match condition.status.as_str() {
            "True" => Ok(true),
            "False" => Ok(false),
            other => Err(ServiceError::invalid_state(format!(
                "unrecognized fleet-shard operator '{READY_CONDITION}' condition status '{other}'"
            ))),
        }
    }

    /// Whether the platform is still converging on a previous resize.
    pub(crate) async fn compute_node_scaling_action_in_progress(
        &self,
        cluster: &Cluster,
    ) -> ServiceResult<bool> {
        let view = self
            .platform
            .get_cluster(&cluster.cluster_id)
            .await
            .map_err(|e| {
                ServiceError::general_with_cause(
                    format!("failed to get cluster {} from platform", cluster.cluster_id),
                    e,
                )
            })?;

        match ConvergenceStatus::from_counts(view.desired_compute_nodes, view.metric_compute_nodes) {
            ConvergenceStatus::Unknown => Err(ServiceError::general(format!(
                "compute node information missing for cluster {}",
                cluster.cluster_id
            ))),
            status => Ok(status.is_converging()),
        }
    }

    fn minimum_footprint(&self, cluster: &Cluster) -> ServiceResult<MinimumFootprint> {
        self.catalog
            .minimum_footprint(cluster.supported_instance_types.as_slice())
    }

    fn node_bounds(report: &DataPlaneClusterStatus) -> NodeBounds {
        NodeBounds {
            current: report.node_info.current,
            ceiling: report.node_info.ceiling,
            floor: report.node_info.floor,
            workload_minimum: report.node_info.current_work_load_minimum,
            node_delta: report.resize_info.node_delta,
        }
    }

    /// Remaining capacity covers one more minimally sized instance.
    fn has_spare_capacity(report: &DataPlaneClusterStatus, footprint: &MinimumFootprint) -> bool {
        report.remaining.connections >= footprint.connections
            && report.remaining.partitions >= footprint.partitions
    }

    /// Decide the next compute-node count from a report.
    pub(crate) fn compute_desired_node_count(
        &self,
        cluster: &Cluster,
        report: &DataPlaneClusterStatus,
    ) -> ServiceResult<ScalingDecision> {
        let footprint = self.minimum_footprint(cluster)?;
        let remaining = &report.remaining;
        let delta = &report.resize_info.delta;

        let pressure = CapacityPressure {
            scale_up_crossed: !Self::has_spare_capacity(report, &footprint),
            scale_down_crossed: remaining.connections >= delta.connections
                && remaining.partitions >= delta.partitions,
        };

        Ok(decide(
            &Self::node_bounds(report),
            node_scaling_multiple(cluster.multi_az),
            pressure,
        ))
    }

    /// Compute the desired node count and request it when it changed.
    pub(crate) async fn update_cluster_nodes(
        &self,
        cluster: &Cluster,
        report: &DataPlaneClusterStatus,
    ) -> ServiceResult<ScalingDecision> {
        let decision = self.compute_desired_node_count(cluster, report)?;
        let current = report.node_info.current;
        let desired = decision.desired(current);

        if desired == current {
            debug!(nodes = current, "No compute node scaling needed");
            return Ok(decision);
        }

        info!(from = current, to = desired, "Scaling compute nodes");
        self.registry
            .set_compute_nodes(&cluster.cluster_id, desired)
            .await
            .inspect_err(|e| warn!(error = %e, desired, "Failed to set compute nodes"))?;

        Ok(decision)
    }

    /// Lifecycle status implied by a report.
    pub(crate) fn derive_cluster_status(
        &self,
        cluster: &Cluster,
        report: &DataPlaneClusterStatus,
        operator_ready: bool,
        scaling_up: bool,
    ) -> ServiceResult<ClusterStatus> {
        let footprint = self.minimum_footprint(cluster)?;

        if operator_ready && Self::has_spare_capacity(report, &footprint) {
            return Ok(ClusterStatus::Ready);
        }

        if scaling_up || !Self::node_bounds(report).at_ceiling(node_scaling_multiple(cluster.multi_az)) {
            return Ok(ClusterStatus::ComputeNodeScalingUp);
        }

        Ok(ClusterStatus::Full)
    }

    /// Derive and persist the lifecycle status. Runs every cycle.
    pub(crate) async fn set_cluster_status(
        &self,
        cluster: &Cluster,
        report: &DataPlaneClusterStatus,
        operator_ready: bool,
        scaling_up: bool,
    ) -> ServiceResult<ClusterStatus> {
        let status = self.derive_cluster_status(cluster, report, operator_ready, scaling_up)?;

        if status != cluster.status {
            info!(from = %cluster.status, to = %status, "Cluster status changed");
        }
        self.registry.update_status(cluster, status).await?;
        Ok(status)
    }
}

//! Data-plane cluster domain types.

use std::collections::HashMap;

use fleet_id::{ClusterId, KafkaId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a data-plane cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    #[serde(rename = "cluster_accepted")]
    Accepted,
    #[serde(rename = "cluster_provisioning")]
    Provisioning,
    #[serde(rename = "cluster_provisioned")]
    Provisioned,
    WaitingForFleetShardOperator,
    Ready,
    ComputeNodeScalingUp,
    Full,
    Failed,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "cluster_accepted",
            Self::Provisioning => "cluster_provisioning",
            Self::Provisioned => "cluster_provisioned",
            Self::WaitingForFleetShardOperator => "waiting_for_fleet_shard_operator",
            Self::Ready => "ready",
            Self::ComputeNodeScalingUp => "compute_node_scaling_up",
            Self::Full => "full",
            Self::Failed => "failed",
        }
    }

    /// Returns true if status reports from the cluster may be processed.
    pub fn can_process_status_reports(&self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Full | Self::WaitingForFleetShardOperator | Self::ComputeNodeScalingUp
        )
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster_accepted" => Ok(Self::Accepted),
            "cluster_provisioning" => Ok(Self::Provisioning),
            "cluster_provisioned" => Ok(Self::Provisioned),
            "waiting_for_fleet_shard_operator" => Ok(Self::WaitingForFleetShardOperator),
            "ready" => Ok(Self::Ready),
            "compute_node_scaling_up" => Ok(Self::ComputeNodeScalingUp),
            "full" => Ok(Self::Full),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown cluster status '{other}'")),
        }
    }
}

/// Live capacity of one instance type on a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicCapacityInfo {
    #[serde(default)]
    pub max_nodes: i32,
    #[serde(default)]
    pub max_units: i32,
    #[serde(default)]
    pub remaining_units: i32,
}

/// A data-plane cluster as known to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub cluster_id: ClusterId,
    pub provider: String,
    pub region: String,
    pub multi_az: bool,
    pub status: ClusterStatus,
    pub supported_instance_types: Vec<String>,
    /// Raw per-instance-type capacity document, as stored.
    pub dynamic_capacity_info: Option<serde_json::Value>,
}

impl Cluster {
    /// Decode the per-instance-type capacity document.
    ///
    /// A cluster without a document has no dynamic capacity; a document that
    /// does not decode is an error.
    pub fn retrieve_dynamic_capacity_info(
        &self,
    ) -> Result<HashMap<String, DynamicCapacityInfo>, serde_json::Error> {
        match &self.dynamic_capacity_info {
            None | Some(serde_json::Value::Null) => Ok(HashMap::new()),
            Some(raw) => serde_json::from_value(raw.clone()),
        }
    }

    pub fn supports_instance_type(&self, instance_type: &str) -> bool {
        self.supported_instance_types.iter().any(|t| t == instance_type)
    }

    /// Supported instance types in their persisted comma-separated form.
    pub fn supported_instance_type_list(&self) -> String {
        self.supported_instance_types.join(",")
    }

    pub fn parse_supported_instance_types(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Filter used to look up placement candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindClusterCriteria {
    pub provider: String,
    pub region: String,
    pub multi_az: bool,
    pub status: ClusterStatus,
    pub supported_instance_type: String,
}

impl FindClusterCriteria {
    pub fn matches(&self, cluster: &Cluster) -> bool {
        cluster.provider == self.provider
            && cluster.region == self.region
            && cluster.multi_az == self.multi_az
            && cluster.status == self.status
            && cluster.supports_instance_type(&self.supported_instance_type)
    }
}

/// A streaming instance waiting to be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaRequest {
    pub id: KafkaId,
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
    pub instance_type: String,
    pub size_id: String,
}

impl KafkaRequest {
    /// The Ready-cluster filter for this request.
    pub fn placement_criteria(&self) -> FindClusterCriteria {
        FindClusterCriteria {
            provider: self.cloud_provider.clone(),
            region: self.region.clone(),
            multi_az: self.multi_az,
            status: ClusterStatus::Ready,
            supported_instance_type: self.instance_type.clone(),
        }
    }
}

/// Lifecycle status of a streaming instance, as far as placement cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KafkaStatus {
    /// Waiting for a cluster.
    Accepted,
    /// Placed on a cluster, being deployed.
    Preparing,
    Provisioning,
    Ready,
    Deleting,
    Failed,
}

impl KafkaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Deleting => "deleting",
            Self::Failed => "failed",
        }
    }

    /// Whether an instance in this status occupies cluster capacity.
    pub fn occupies_capacity(&self) -> bool {
        !matches!(self, Self::Deleting | Self::Failed)
    }
}

/// Number of workloads placed on a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaInstanceCount {
    pub cluster_id: ClusterId,
    pub count: i32,
}

/// Streaming units consumed on a cluster by one instance type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingUnitCount {
    pub cluster_id: ClusterId,
    pub instance_type: String,
    pub count: i32,
}

/// Streaming-unit usage across all clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingUnitCountPerClusterList(pub Vec<StreamingUnitCount>);

impl StreamingUnitCountPerClusterList {
    pub fn streaming_unit_count_for(&self, cluster_id: &ClusterId, instance_type: &str) -> i32 {
        self.0
            .iter()
            .filter(|c| &c.cluster_id == cluster_id && c.instance_type == instance_type)
            .map(|c| c.count)
            .sum()
    }
}

/// Static configuration handed to a data-plane cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConfig {
    pub observability: ClusterConfigObservability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConfigObservability {
    pub access_token: String,
    pub channel: String,
    pub repository: String,
    pub tag: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    pub(crate) fn ready_cluster(id: &str) -> Cluster {
        Cluster {
            cluster_id: ClusterId::parse(id).unwrap(),
            provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            multi_az: true,
            status: ClusterStatus::Ready,
            supported_instance_types: vec!["standard".to_string(), "developer".to_string()],
            dynamic_capacity_info: None,
        }
    }

    #[rstest]
    #[case(ClusterStatus::Ready, true)]
    #[case(ClusterStatus::Full, true)]
    #[case(ClusterStatus::WaitingForFleetShardOperator, true)]
    #[case(ClusterStatus::ComputeNodeScalingUp, true)]
    #[case(ClusterStatus::Accepted, false)]
    #[case(ClusterStatus::Provisioning, false)]
    #[case(ClusterStatus::Provisioned, false)]
    #[case(ClusterStatus::Failed, false)]
    fn test_can_process_status_reports(#[case] status: ClusterStatus, #[case] want: bool) {
        assert_eq!(status.can_process_status_reports(), want);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            ClusterStatus::Accepted,
            ClusterStatus::Provisioning,
            ClusterStatus::Provisioned,
            ClusterStatus::WaitingForFleetShardOperator,
            ClusterStatus::Ready,
            ClusterStatus::ComputeNodeScalingUp,
            ClusterStatus::Full,
            ClusterStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ClusterStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_retrieve_dynamic_capacity_info() {
        let mut cluster = ready_cluster("a");
        cluster.dynamic_capacity_info = Some(serde_json::json!({
            "standard": {"max_nodes": 30, "max_units": 10, "remaining_units": 4}
        }));
        let info = cluster.retrieve_dynamic_capacity_info().unwrap();
        assert_eq!(info["standard"].max_units, 10);
        assert!(!info.contains_key("developer"));
    }

    #[test]
    fn test_retrieve_dynamic_capacity_info_malformed() {
        let mut cluster = ready_cluster("a");
        cluster.dynamic_capacity_info = Some(serde_json::json!(["not", "a", "map"]));
        assert!(cluster.retrieve_dynamic_capacity_info().is_err());
    }

    #[test]
    fn test_retrieve_dynamic_capacity_info_absent() {
        let info = ready_cluster("a").retrieve_dynamic_capacity_info().unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_supported_instance_types_roundtrip() {
        let cluster = ready_cluster("a");
        let raw = cluster.supported_instance_type_list();
        assert_eq!(raw, "standard,developer");
        assert_eq!(Cluster::parse_supported_instance_types(&raw), cluster.supported_instance_types);
        assert!(Cluster::parse_supported_instance_types("").is_empty());
    }

    #[test]
    fn test_criteria_matches() {
        let request = KafkaRequest {
            id: KafkaId::new(),
            cloud_provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            multi_az: true,
            instance_type: "standard".to_string(),
            size_id: "x1".to_string(),
        };
        let criteria = request.placement_criteria();
        let mut cluster = ready_cluster("a");
        assert!(criteria.matches(&cluster));

        cluster.status = ClusterStatus::Full;
        assert!(!criteria.matches(&cluster));
    }

    #[test]
    fn test_streaming_unit_count_for() {
        let a = ClusterId::parse("a").unwrap();
        let list = StreamingUnitCountPerClusterList(vec![
            StreamingUnitCount { cluster_id: a.clone(), instance_type: "standard".into(), count: 4 },
            StreamingUnitCount { cluster_id: a.clone(), instance_type: "developer".into(), count: 2 },
        ]);
        assert_eq!(list.streaming_unit_count_for(&a, "standard"), 4);
        assert_eq!(list.streaming_unit_count_for(&ClusterId::parse("b").unwrap(), "standard"), 0);
    }
}

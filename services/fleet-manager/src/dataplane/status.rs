//! Status report types sent by data-plane clusters.

use serde::{Deserialize, Serialize};

/// One health signal from the fleet-shard operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusCondition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub ceiling: i32,
    pub floor: i32,
    pub current: i32,
    pub current_work_load_minimum: i32,
}

/// A quantity of streaming capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub connections: i64,
    pub partitions: i64,
    #[serde(default)]
    pub ingress_egress_throughput_per_sec: String,
    #[serde(default)]
    pub data_retention_size: String,
}

/// What one scaling step adds or removes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeInfo {
    pub node_delta: i32,
    pub delta: ClusterCapacity,
}

/// A status report from a data-plane cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneClusterStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    pub node_info: NodeInfo,
    pub remaining: ClusterCapacity,
    pub resize_info: ResizeInfo,
}

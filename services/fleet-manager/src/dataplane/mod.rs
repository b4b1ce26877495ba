//! Data-plane cluster status processing.
//!
//! Clusters periodically report their node counts, remaining capacity and
//! the health of the fleet-shard operator. For each report the
//! [`DataPlaneClusterService`] decides the next compute-node count and the
//! cluster's lifecycle status, and persists both through the registry.

mod service;
mod status;

pub use service::DataPlaneClusterService;
pub use status::{
    ClusterCapacity, DataPlaneClusterStatus, NodeInfo, ResizeInfo, StatusCondition,
};

//! Capacity model.
//!
//! Describes, per instance type and size, how much of a data-plane cluster a
//! streaming instance consumes, and the compute-node granularity a cluster
//! can be resized by. Everything here is a pure function of static
//! configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{ServiceError, ServiceResult};

/// Compute nodes are added and removed three at a time on multi-AZ clusters,
/// one per availability zone.
pub const MULTI_AZ_NODE_SCALING_MULTIPLE: i32 = 3;

/// Single-AZ clusters scale one node at a time.
pub const SINGLE_AZ_NODE_SCALING_MULTIPLE: i32 = 1;

/// Resize-step granularity for a cluster type.
pub fn node_scaling_multiple(multi_az: bool) -> i32 {
    if multi_az {
        MULTI_AZ_NODE_SCALING_MULTIPLE
    } else {
        SINGLE_AZ_NODE_SCALING_MULTIPLE
    }
}

/// One size of an instance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSize {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub ingress_throughput_per_sec: String,
    #[serde(default)]
    pub egress_throughput_per_sec: String,
    pub total_max_connections: i64,
    pub max_partitions: i64,
    #[serde(default)]
    pub max_data_retention_size: String,
    #[serde(default)]
    pub max_connection_attempts_per_sec: i64,
    #[serde(default = "default_units")]
    pub quota_consumed: i32,
    /// Streaming units this size takes out of a cluster.
    #[serde(default = "default_units")]
    pub capacity_consumed: i32,
}

fn default_units() -> i32 {
    1
}

/// An instance type (for example `standard` or `developer`) and its sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceType {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub sizes: Vec<InstanceSize>,
}

/// The smallest connection and partition footprint among a set of sizes.
///
/// A cluster whose remaining capacity is below either value cannot take one
/// more instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumFootprint {
    pub connections: i64,
    pub partitions: i64,
}

/// All configured instance types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeCatalog {
    pub supported_instance_types: Vec<InstanceType>,
}

impl InstanceTypeCatalog {
    /// Parse and validate a catalog from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the catalog for duplicates and nonsensical sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_instance_types.is_empty() {
            return Err(ConfigError::invalid("no instance types configured"));
        }

        let mut seen_types = std::collections::HashSet::new();
        for instance_type in &self.supported_instance_types {
            if !seen_types.insert(instance_type.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate instance type '{}'",
                    instance_type.id
                )));
            }
            if instance_type.sizes.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "instance type '{}' has no sizes",
                    instance_type.id
                )));
            }

            let mut seen_sizes = std::collections::HashSet::new();
            for size in &instance_type.sizes {
                let at = format!("{}/{}", instance_type.id, size.id);
                if !seen_sizes.insert(size.id.as_str()) {
                    return Err(ConfigError::invalid(format!("duplicate size '{at}'")));
                }
                if size.capacity_consumed < 1 || size.quota_consumed < 1 {
                    return Err(ConfigError::invalid(format!(
                        "size '{at}' must consume at least one streaming unit and one quota unit"
                    )));
                }
                if size.total_max_connections < 1 || size.max_partitions < 1 {
                    return Err(ConfigError::invalid(format!(
                        "size '{at}' must allow at least one connection and one partition"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up an instance type by id.
    pub fn instance_type(&self, id: &str) -> Option<&InstanceType> {
        self.supported_instance_types.iter().find(|t| t.id == id)
    }

    /// Resolve the size a workload asked for.
    pub fn get_instance_size(&self, instance_type: &str, size_id: &str) -> ServiceResult<&InstanceSize> {
        let Some(t) = self.instance_type(instance_type) else {
            return Err(ServiceError::not_found(format!(
                "instance type '{instance_type}' is not supported"
            )));
        };

        t.sizes.iter().find(|s| s.id == size_id).ok_or_else(|| {
            ServiceError::not_found(format!(
                "instance size '{size_id}' is not supported for instance type '{instance_type}'"
            ))
        })
    }

    /// Smallest footprint among all sizes of the given instance types.
    ///
    /// Falls back to every configured type when none of `instance_types` is
    /// known, so a cluster with a stale type list still gets a threshold.
    pub fn minimum_footprint<S: AsRef<str>>(&self, instance_types: &[S]) -> ServiceResult<MinimumFootprint> {
        let selected: Vec<&InstanceType> = instance_types
            .iter()
            .filter_map(|id| self.instance_type(id.as_ref()))
            .collect();

        let candidates: Vec<&InstanceType> = if selected.is_empty() {
            self.supported_instance_types.iter().collect()
        } else {
            selected
        };

        let sizes = candidates.iter().flat_map(|t| t.sizes.iter());
        let connections = sizes.clone().map(|s| s.total_max_connections).min();
        let partitions = sizes.map(|s| s.max_partitions).min();

        match (connections, partitions) {
            (Some(connections), Some(partitions)) => Ok(MinimumFootprint {
                connections,
                partitions,
            }),
            _ => Err(ServiceError::not_found("no instance sizes configured")),
        }
    }
}

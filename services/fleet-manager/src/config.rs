//! Configuration for the fleet manager.
//!
//! Everything is read once at startup into explicit structs that are handed
//! to constructors. Nothing below is consulted as global state afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_id::ClusterId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capacity::InstanceTypeCatalog;
use crate::db::DbConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// How compute nodes of data-plane clusters are managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    /// Operators size clusters by hand and cap them with per-cluster limits.
    Manual,

    /// The fleet manager resizes clusters from their status reports.
    Auto,

    /// Scaling happens outside the fleet manager entirely.
    #[default]
    None,
}

impl std::str::FromStr for ScalingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "none" | "" => Ok(Self::None),
            _ => Err(ConfigError::InvalidEnv {
                name: "FLEET_DATAPLANE_SCALING_MODE",
                value: s.to_string(),
            }),
        }
    }
}

/// A statically configured cluster entry, used in manual scaling mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCluster {
    pub cluster_id: ClusterId,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub multi_az: bool,
    /// Whether new workloads may be placed on this cluster.
    #[serde(default = "default_schedulable")]
    pub schedulable: bool,
    /// Upper bound on streaming units placed on this cluster.
    pub kafka_instance_limit: i32,
}

fn default_schedulable() -> bool {
    true
}

/// Ordered list of manually managed clusters.
///
/// Order is significant: placement fills clusters in the order they are
/// listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterList(Vec<ManualCluster>);

impl ClusterList {
    pub fn new(clusters: Vec<ManualCluster>) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for c in &clusters {
            if !seen.insert(&c.cluster_id) {
                return Err(ConfigError::invalid(format!(
                    "cluster '{}' is listed more than once",
                    c.cluster_id
                )));
            }
            if c.kafka_instance_limit < 0 {
                return Err(ConfigError::invalid(format!(
                    "cluster '{}' has a negative instance limit",
                    c.cluster_id
                )));
            }
        }
        Ok(Self(clusters))
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let clusters: Vec<ManualCluster> = serde_json::from_str(raw)?;
        Self::new(clusters)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManualCluster> {
        self.0.iter()
    }

    pub fn get(&self, cluster_id: &ClusterId) -> Option<&ManualCluster> {
        self.0.iter().find(|c| &c.cluster_id == cluster_id)
    }

    /// Returns true if the cluster is listed and marked schedulable.
    pub fn is_cluster_schedulable(&self, cluster_id: &ClusterId) -> bool {
        self.get(cluster_id).is_some_and(|c| c.schedulable)
    }

    /// Returns true if `count` streaming units stay within the cluster's limit.
    ///
    /// Unlisted clusters have no capacity.
    pub fn is_number_of_kafka_within_cluster_limit(&self, cluster_id: &ClusterId, count: i32) -> bool {
        self.get(cluster_id)
            .is_some_and(|c| count <= c.kafka_instance_limit)
    }
}

/// Data-plane cluster placement and scaling configuration.
#[derive(Debug, Clone, Default)]
pub struct DataplaneClusterConfig {
    pub scaling_mode: ScalingMode,
    pub cluster_config: ClusterList,
}

impl DataplaneClusterConfig {
    pub fn is_manual_scaling_enabled(&self) -> bool {
        self.scaling_mode == ScalingMode::Manual
    }

    pub fn is_auto_scaling_enabled(&self) -> bool {
        self.scaling_mode == ScalingMode::Auto
    }
}

/// Instance type catalog wrapper.
#[derive(Debug, Clone, Default)]
pub struct KafkaConfig {
    pub instance_types: InstanceTypeCatalog,
}

/// Observability stack settings handed to data-plane clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub repository: String,
    pub channel: String,
    pub access_token: String,
    pub tag: String,
}

/// Fleet manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub dev_mode: bool,
    pub placement_interval: Duration,
    /// `None` when `DATABASE_URL` is unset; the binary then runs in memory.
    pub database: Option<DbConfig>,
    pub dataplane: DataplaneClusterConfig,
    pub kafka: KafkaConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from environment variables and referenced files.
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level = std::env::var("FLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("FLEET_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let placement_interval = match std::env::var("FLEET_PLACEMENT_INTERVAL_SECS") {
            Ok(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "FLEET_PLACEMENT_INTERVAL_SECS",
                value: v.clone(),
            })?),
            Err(_) => Duration::from_secs(5),
        };

        let database = std::env::var("DATABASE_URL").ok().map(|_| DbConfig::from_env());

        let scaling_mode: ScalingMode = std::env::var("FLEET_DATAPLANE_SCALING_MODE")
            .unwrap_or_default()
            .parse()?;

        let cluster_config = match std::env::var("FLEET_DATAPLANE_CLUSTER_CONFIG_FILE") {
            Ok(path) => ClusterList::from_json(&read_file(Path::new(&path))?)?,
            Err(_) if scaling_mode == ScalingMode::Manual => {
                return Err(ConfigError::invalid(
                    "manual scaling mode requires FLEET_DATAPLANE_CLUSTER_CONFIG_FILE",
                ));
            }
            Err(_) => ClusterList::default(),
        };

        let instance_types = match std::env::var("FLEET_INSTANCE_TYPES_FILE") {
            Ok(path) => InstanceTypeCatalog::from_json(&read_file(Path::new(&path))?)?,
            Err(_) => {
                return Err(ConfigError::invalid("FLEET_INSTANCE_TYPES_FILE is required"));
            }
        };

        let env_or_empty = |name: &str| std::env::var(name).unwrap_or_default();
        let observability = ObservabilityConfig {
            repository: env_or_empty("FLEET_OBSERVABILITY_REPO"),
            channel: env_or_empty("FLEET_OBSERVABILITY_CHANNEL"),
            access_token: env_or_empty("FLEET_OBSERVABILITY_ACCESS_TOKEN"),
            tag: env_or_empty("FLEET_OBSERVABILITY_TAG"),
        };

        Ok(Self {
            log_level,
            dev_mode,
            placement_interval,
            database,
            dataplane: DataplaneClusterConfig {
                scaling_mode,
                cluster_config,
            },
            kafka: KafkaConfig { instance_types },
            observability,
        })
    }
}

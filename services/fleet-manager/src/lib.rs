//! Fleet manager library.
//!
//! Capacity-aware placement of streaming instances onto data-plane clusters
//! and node-count autoscaling of those clusters. The crate ships a
//! `fleet-manager` binary running the placement worker; the library surface
//! exposes the reconciler and registries for embedding and integration tests.

pub mod capacity;
pub mod cluster;
pub mod config;
pub mod dataplane;
pub mod db;
pub mod error;
pub mod placement;
pub mod platform;
pub mod registry;
pub mod scheduler;

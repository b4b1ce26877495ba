//! # fleet-id
//!
//! Typed identifiers used by the fleet manager.
//!
//! Two families of ids exist:
//!
//! - **Minted ids** are generated by the fleet manager itself. They use the
//!   prefixed ULID format `{prefix}_{ulid}` (for example
//!   `kfk_01HV4Z2WQXKJNM8GPQY6VBKC3D`), so they sort by creation time and the
//!   prefix tells the resource type apart.
//! - **External ids** are assigned by a cloud provider or an operator, such as
//!   data-plane cluster ids. They are opaque strings; the fleet manager only
//!   checks that they are non-empty and use a conservative character set.
//!
//! Both families are distinct types, so a cluster id can never be passed
//! where a workload id is expected.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

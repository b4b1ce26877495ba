//! ID types for fleet resources.

use crate::{define_external_id, define_id};

// =============================================================================
// Minted
// =============================================================================

define_id!(KafkaId, "kfk");

// =============================================================================
// External
// =============================================================================

define_external_id!(ClusterId);

//! # CassandraCluster Status

use serde::{Deserialize, Serialize};

/// Status of the CassandraCluster resource
///
/// Mirrors what the backing StatefulSet reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraClusterStatus {
    /// Number of pods the StatefulSet reports at the current revision
    #[serde(default)]
    pub current_replicas: i32,
}

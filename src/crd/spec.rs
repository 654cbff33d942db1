//! # CassandraCluster Spec
//!
//! Main CRD specification type.

use serde::{Deserialize, Serialize};

/// CassandraCluster Custom Resource Definition
///
/// Declares a Cassandra ring the controller realises as a StatefulSet plus two
/// headless Services.
///
/// # Example
///
/// ```yaml
/// apiVersion: cassandra.k8s.io/v1alpha1
/// kind: CassandraCluster
/// metadata:
///   name: ring
///   namespace: default
/// spec:
///   statefulsetName: cassandra
///   replicas: 3
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "CassandraCluster",
    group = "cassandra.k8s.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::CassandraClusterStatus",
    shortname = "cc",
    derive = "PartialEq",
    printcolumn = r#"{"name":"StatefulSet", "type":"string", "jsonPath":".spec.statefulsetName"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Current", "type":"integer", "jsonPath":".status.currentReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CassandraClusterSpec {
    /// Name of the StatefulSet (and of its headless Services) backing the ring.
    /// Required. Must be a DNS-1123 label short enough to take the `-unready` suffix.
    #[serde(default)]
    pub statefulset_name: String,
    /// Desired number of Cassandra nodes.
    /// When unset the StatefulSet's replica count is left alone.
    #[serde(default)]
    pub replicas: Option<i32>,
}

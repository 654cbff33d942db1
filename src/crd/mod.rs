//! # Custom Resource Definitions
//!
//! CRD types for the Cassandra controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `CassandraCluster` and its spec
//! - `status.rs` - Status reported back by the controller

mod spec;
mod status;

pub use spec::{CassandraCluster, CassandraClusterSpec};
pub use status::CassandraClusterStatus;

/// Kind recorded in owner references of derived resources
pub const CASSANDRA_CLUSTER_KIND: &str = "CassandraCluster";

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::CustomResourceExt;

    #[test]
    fn test_deserialize_full_resource() {
        let yaml = r"
apiVersion: cassandra.k8s.io/v1alpha1
kind: CassandraCluster
metadata:
  name: ring
  namespace: db
spec:
  statefulsetName: cassandra
  replicas: 3
status:
  currentReplicas: 2
";
        let cluster: CassandraCluster =
            serde_yaml::from_str(yaml).expect("Should deserialize CassandraCluster");

        assert_eq!(cluster.spec.statefulset_name, "cassandra");
        assert_eq!(cluster.spec.replicas, Some(3));
        assert_eq!(
            cluster.status.as_ref().map(|s| s.current_replicas),
            Some(2)
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let yaml = r"
apiVersion: cassandra.k8s.io/v1alpha1
kind: CassandraCluster
metadata:
  name: ring
spec: {}
";
        let cluster: CassandraCluster =
            serde_yaml::from_str(yaml).expect("Should deserialize empty spec");

        assert!(cluster.spec.statefulset_name.is_empty());
        assert_eq!(cluster.spec.replicas, None);
        assert!(cluster.status.is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = CassandraCluster::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("cassandraclusters.cassandra.k8s.io")
        );
        assert_eq!(crd.spec.names.kind, CASSANDRA_CLUSTER_KIND);
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}

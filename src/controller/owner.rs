//! # Ownership
//!
//! Controller owner references link every derived resource back to the
//! `CassandraCluster` that created it.

use crate::crd::{CassandraCluster, CASSANDRA_CLUSTER_KIND};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Owner reference marking `cluster` as the managing controller
#[must_use]
pub fn controller_reference(cluster: &CassandraCluster) -> OwnerReference {
    OwnerReference {
        api_version: CassandraCluster::api_version(&()).to_string(),
        kind: CassandraCluster::kind(&()).to_string(),
        name: cluster.name_any(),
        uid: cluster.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// The owner reference flagged as controller, if any
pub fn controller_of<K: ResourceExt>(obj: &K) -> Option<&OwnerReference> {
    obj.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
}

/// Whether `obj` is controlled by `cluster`.
///
/// UIDs are compared when both sides carry one; otherwise kind and name must match.
pub fn is_controlled_by<K: ResourceExt>(obj: &K, cluster: &CassandraCluster) -> bool {
    let Some(owner) = controller_of(obj) else {
        return false;
    };
    match cluster.uid() {
        Some(uid) if !uid.is_empty() && !owner.uid.is_empty() => owner.uid == uid,
        _ => owner.kind == CASSANDRA_CLUSTER_KIND && owner.name == cluster.name_any(),
    }
}

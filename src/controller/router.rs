//! # Ownership Router
//!
//! Routes change notifications to the work queue.
//!
//! `CassandraCluster` changes enqueue the cluster's own key. Changes to derived
//! objects enqueue the key of the cluster named by their controller owner
//! reference, provided that cluster is still in the cache. Everything else
//! (unowned objects, foreign owners, orphans) is dropped.

use crate::controller::informer::{DeletedObject, EventHandler};
use crate::controller::key::ReconcileKey;
use crate::controller::owner;
use crate::controller::queue::WorkQueue;
use crate::crd::{CassandraCluster, CASSANDRA_CLUSTER_KIND};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube_runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;
use tracing::{debug, error};

/// A derived object of any managed kind
#[derive(Debug, Clone)]
pub enum DerivedObject {
    StatefulSet(Arc<StatefulSet>),
    Service(Arc<Service>),
}

impl DerivedObject {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatefulSet(_) => "StatefulSet",
            Self::Service(_) => "Service",
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::StatefulSet(obj) => obj.name_any(),
            Self::Service(obj) => obj.name_any(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<String> {
        match self {
            Self::StatefulSet(obj) => obj.namespace(),
            Self::Service(obj) => obj.namespace(),
        }
    }

    #[must_use]
    pub fn owner_references(&self) -> &[OwnerReference] {
        match self {
            Self::StatefulSet(obj) => obj.owner_references(),
            Self::Service(obj) => obj.owner_references(),
        }
    }

    #[must_use]
    pub fn controller(&self) -> Option<&OwnerReference> {
        match self {
            Self::StatefulSet(obj) => owner::controller_of(obj.as_ref()),
            Self::Service(obj) => owner::controller_of(obj.as_ref()),
        }
    }
}

impl From<Arc<StatefulSet>> for DerivedObject {
    fn from(obj: Arc<StatefulSet>) -> Self {
        Self::StatefulSet(obj)
    }
}

impl From<Arc<Service>> for DerivedObject {
    fn from(obj: Arc<Service>) -> Self {
        Self::Service(obj)
    }
}

/// Maps derived-object changes to the key of their owning cluster
pub struct OwnershipRouter {
    clusters: Store<CassandraCluster>,
    queue: Arc<WorkQueue>,
}

impl std::fmt::Debug for OwnershipRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipRouter")
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

impl OwnershipRouter {
    #[must_use]
    pub fn new(clusters: Store<CassandraCluster>, queue: Arc<WorkQueue>) -> Self {
        Self { clusters, queue }
    }

    /// Key of the cached cluster that controls `obj`, if any
    #[must_use]
    pub fn route(&self, obj: &DerivedObject) -> Option<String> {
        let owner = obj.controller()?;
        if owner.kind != CASSANDRA_CLUSTER_KIND {
            return None;
        }

        let namespace = obj.namespace().unwrap_or_default();
        let cluster_ref = ObjectRef::<CassandraCluster>::new(&owner.name).within(&namespace);
        if self.clusters.get(&cluster_ref).is_none() {
            debug!(
                "Ignoring orphaned {} {}/{} of CassandraCluster {}",
                obj.kind(),
                namespace,
                obj.name(),
                owner.name
            );
            return None;
        }

        Some(ReconcileKey::new(namespace, owner.name.clone()).to_string())
    }

    /// Enqueue the owner of `obj`, if it has a cached one
    pub fn handle_object(&self, obj: &DerivedObject) {
        if let Some(key) = self.route(obj) {
            debug!(
                "Processing {} {}, enqueueing {}",
                obj.kind(),
                obj.name(),
                key
            );
            self.queue.add(key);
        }
    }

    fn handle_deleted<K>(&self, deleted: DeletedObject<K>)
    where
        Arc<K>: Into<DerivedObject>,
    {
        match deleted {
            DeletedObject::Live(obj) => self.handle_object(&obj.into()),
            DeletedObject::Tombstone {
                last_known: Some(obj),
                key,
            } => {
                debug!("Recovered deleted object {} from tombstone", key);
                self.handle_object(&obj.into());
            }
            DeletedObject::Tombstone {
                last_known: None,
                key,
            } => {
                error!("Error decoding object {}, invalid tombstone", key);
            }
        }
    }
}

impl<K> EventHandler<K> for OwnershipRouter
where
    K: ResourceExt + Send + Sync,
    Arc<K>: Into<DerivedObject>,
{
    fn on_add(&self, obj: Arc<K>) {
        self.handle_object(&obj.into());
    }

    fn on_update(&self, old: Arc<K>, new: Arc<K>) {
        // Periodic resyncs re-deliver unchanged objects
        if old.resource_version() == new.resource_version() {
            return;
        }
        self.handle_object(&new.into());
    }

    fn on_delete(&self, obj: DeletedObject<K>) {
        self.handle_deleted(obj);
    }
}

/// Enqueues `CassandraCluster` changes under their own key
#[derive(Debug)]
pub struct ClusterEventHandler {
    queue: Arc<WorkQueue>,
}

impl ClusterEventHandler {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    fn enqueue(&self, cluster: &CassandraCluster) {
        self.queue.add(ReconcileKey::for_object(cluster));
    }
}

impl EventHandler<CassandraCluster> for ClusterEventHandler {
    fn on_add(&self, obj: Arc<CassandraCluster>) {
        self.enqueue(&obj);
    }

    fn on_update(&self, _old: Arc<CassandraCluster>, new: Arc<CassandraCluster>) {
        self.enqueue(&new);
    }

    fn on_delete(&self, obj: DeletedObject<CassandraCluster>) {
        // Derived resources are garbage collected through their owner references
        if let Some(cluster) = obj.object() {
            debug!(
                "CassandraCluster {} deleted",
                ReconcileKey::for_object(cluster.as_ref())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::owner::controller_reference;
    use crate::crd::CassandraClusterSpec;
    use kube::api::ObjectMeta;
    use kube_runtime::reflector::store::Writer;
    use kube_runtime::watcher;
    use std::time::Duration;

    fn cluster(name: &str) -> CassandraCluster {
        let mut cluster = CassandraCluster::new(
            name,
            CassandraClusterSpec {
                statefulset_name: "cassandra".to_string(),
                replicas: Some(3),
            },
        );
        cluster.metadata.namespace = Some("db".to_string());
        cluster.metadata.uid = Some(format!("uid-{name}"));
        cluster
    }

    fn statefulset(owners: Vec<OwnerReference>, resource_version: &str) -> Arc<StatefulSet> {
        Arc::new(StatefulSet {
            metadata: ObjectMeta {
                name: Some("cassandra".to_string()),
                namespace: Some("db".to_string()),
                resource_version: Some(resource_version.to_string()),
                owner_references: Some(owners),
                ..ObjectMeta::default()
            },
            ..StatefulSet::default()
        })
    }

    fn setup(cached: &[CassandraCluster]) -> (OwnershipRouter, Arc<WorkQueue>) {
        let mut writer: Writer<CassandraCluster> = Writer::default();
        for cluster in cached {
            writer.apply_watcher_event(&watcher::Event::Apply(cluster.clone()));
        }
        let queue = Arc::new(WorkQueue::new(
            "router-test",
            Duration::from_millis(5),
            Duration::from_secs(1),
        ));
        (OwnershipRouter::new(writer.as_reader(), queue.clone()), queue)
    }

    #[tokio::test]
    async fn test_owned_object_enqueues_owner_key() {
        let ring = cluster("ring");
        let (router, queue) = setup(&[ring.clone()]);

        router.on_add(statefulset(vec![controller_reference(&ring)], "1"));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await.as_deref(), Some("db/ring"));
    }

    #[test]
    fn test_orphan_is_dropped() {
        let (router, queue) = setup(&[]);

        router.on_add(statefulset(vec![controller_reference(&cluster("gone"))], "1"));

        assert!(queue.is_empty());
    }

    #[test]
    fn test_unowned_and_foreign_objects_are_dropped() {
        let ring = cluster("ring");
        let (router, queue) = setup(&[ring.clone()]);

        router.on_add(statefulset(vec![], "1"));

        let mut foreign = controller_reference(&ring);
        foreign.kind = "Deployment".to_string();
        router.on_add(statefulset(vec![foreign], "1"));

        assert!(queue.is_empty());
    }

    #[test]
    fn test_resync_with_same_resource_version_is_suppressed() {
        let ring = cluster("ring");
        let (router, queue) = setup(&[ring.clone()]);
        let owners = vec![controller_reference(&ring)];

        router.on_update(statefulset(owners.clone(), "4"), statefulset(owners.clone(), "4"));
        assert!(queue.is_empty());

        router.on_update(statefulset(owners.clone(), "4"), statefulset(owners, "5"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_tombstones_route_through_last_known_state() {
        let ring = cluster("ring");
        let (router, queue) = setup(&[ring.clone()]);

        router.on_delete(DeletedObject::<StatefulSet>::Tombstone {
            key: "db/cassandra".to_string(),
            last_known: None,
        });
        assert!(queue.is_empty());

        router.on_delete(DeletedObject::Tombstone {
            key: "db/cassandra".to_string(),
            last_known: Some(statefulset(vec![controller_reference(&ring)], "9")),
        });
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_service_events_route_like_statefulsets() {
        let ring = cluster("ring");
        let (router, queue) = setup(&[ring.clone()]);
        let service = Arc::new(Service {
            metadata: ObjectMeta {
                name: Some("cassandra-unready".to_string()),
                namespace: Some("db".to_string()),
                owner_references: Some(vec![controller_reference(&ring)]),
                ..ObjectMeta::default()
            },
            ..Service::default()
        });

        router.on_delete(DeletedObject::Live(service));

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cluster_handler_always_enqueues_updates() {
        let queue = Arc::new(WorkQueue::new(
            "cluster-test",
            Duration::from_millis(5),
            Duration::from_secs(1),
        ));
        let handler = ClusterEventHandler::new(queue.clone());
        let ring = Arc::new(cluster("ring"));

        handler.on_update(ring.clone(), ring.clone());
        handler.on_delete(DeletedObject::Live(ring));

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_debug_names_the_queue() {
        let (router, queue) = setup(&[]);
        assert!(format!("{router:?}").contains("router-test"));
        assert!(format!("{:?}", ClusterEventHandler::new(queue)).contains("router-test"));
    }
}

//! # Routing Tests
//!
//! Watch events flowing through an informer into the ownership router and the
//! work queue.

mod common;

use cassandra_controller::controller::informer::Informer;
use cassandra_controller::controller::owner::controller_reference;
use cassandra_controller::controller::queue::WorkQueue;
use cassandra_controller::controller::resources::{new_stateful_set, new_unready_service};
use cassandra_controller::controller::router::{ClusterEventHandler, OwnershipRouter};
use cassandra_controller::crd::CassandraCluster;
use common::{cluster, store, KEY};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;

fn queue() -> Arc<WorkQueue> {
    Arc::new(WorkQueue::new(
        "routing-test",
        Duration::from_millis(5),
        Duration::from_secs(1),
    ))
}

fn with_version<K: kube::Resource>(mut obj: K, resource_version: &str) -> K {
    obj.meta_mut().resource_version = Some(resource_version.to_string());
    obj
}

#[tokio::test]
async fn test_owned_statefulset_events_enqueue_cluster_once() {
    let domain = cluster("cassandra", Some(3));
    let queue = queue();
    let router = OwnershipRouter::new(store(&[domain.clone()]), queue.clone());
    let mut informer = Informer::<StatefulSet>::new();

    informer.handle_event(
        watcher::Event::Apply(with_version(new_stateful_set(&domain), "1")),
        &router,
    );
    informer.handle_event(
        watcher::Event::Apply(with_version(new_stateful_set(&domain), "2")),
        &router,
    );

    assert_eq!(queue.len(), 1, "duplicate adds collapse");
    assert_eq!(queue.get().await.as_deref(), Some(KEY));
}

#[test]
fn test_orphaned_statefulset_is_dropped() {
    let queue = queue();
    let router = OwnershipRouter::new(store(&[]), queue.clone());
    let mut informer = Informer::<StatefulSet>::new();

    let sts = new_stateful_set(&cluster("cassandra", Some(3)));
    informer.handle_event(watcher::Event::Apply(with_version(sts, "1")), &router);

    assert!(queue.is_empty());
}

#[test]
fn test_resync_of_derived_objects_does_not_enqueue() {
    let domain = cluster("cassandra", Some(3));
    let queue = queue();
    let router = OwnershipRouter::new(store(&[domain.clone()]), queue.clone());
    let mut informer = Informer::<Service>::new();
    informer.handle_event(watcher::Event::Init, &router);
    informer.handle_event(
        watcher::Event::InitApply(with_version(new_unready_service(&domain), "3")),
        &router,
    );
    informer.handle_event(watcher::Event::InitDone, &router);
    assert_eq!(queue.len(), 1);
    queue.shut_down();

    let queue = self::queue();
    let router = OwnershipRouter::new(store(&[domain]), queue.clone());
    informer.resync(&router);

    assert!(queue.is_empty());
}

#[test]
fn test_vanished_statefulset_routes_through_tombstone() {
    let domain = cluster("cassandra", Some(3));
    let queue = queue();
    let router = OwnershipRouter::new(store(&[domain.clone()]), queue.clone());
    let mut informer = Informer::<StatefulSet>::new();

    informer.handle_event(watcher::Event::Init, &router);
    informer.handle_event(
        watcher::Event::InitApply(with_version(new_stateful_set(&domain), "1")),
        &router,
    );
    informer.handle_event(watcher::Event::InitDone, &router);
    assert_eq!(queue.len(), 1);

    // Re-list without the StatefulSet
    let fresh_queue = self::queue();
    let router = OwnershipRouter::new(store(&[domain]), fresh_queue.clone());
    informer.handle_event(watcher::Event::Init, &router);
    informer.handle_event(watcher::Event::InitDone, &router);

    assert_eq!(fresh_queue.len(), 1);
    assert!(informer.reader().state().is_empty());
}

#[test]
fn test_cluster_resync_enqueues() {
    let queue = queue();
    let handler = ClusterEventHandler::new(queue.clone());
    let mut informer = Informer::<CassandraCluster>::new();

    informer.handle_event(
        watcher::Event::Apply(cluster("cassandra", Some(3))),
        &handler,
    );
    assert_eq!(queue.len(), 1);

    informer.resync(&handler);
    assert_eq!(queue.len(), 1, "still deduplicated while queued");
}

#[test]
fn test_foreign_owner_kind_is_ignored() {
    let domain = cluster("cassandra", Some(3));
    let queue = queue();
    let router = OwnershipRouter::new(store(&[domain.clone()]), queue.clone());
    let mut informer = Informer::<StatefulSet>::new();

    let mut sts = new_stateful_set(&domain);
    let mut owner = controller_reference(&domain);
    owner.kind = "ReplicaSet".to_string();
    sts.metadata.owner_references = Some(vec![owner]);
    informer.handle_event(watcher::Event::Apply(with_version(sts, "1")), &router);

    assert!(queue.is_empty());
}

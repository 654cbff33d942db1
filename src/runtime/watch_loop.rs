//! # Watch Loop
//!
//! Wires the informers, the router, the work queue and the worker pool together
//! and runs them until shutdown.

use crate::controller::events::KubeEventRecorder;
use crate::controller::informer::{EventHandler, Informer};
use crate::controller::manager::KubeResourceManager;
use crate::controller::queue::WorkQueue;
use crate::controller::router::{ClusterEventHandler, OwnershipRouter};
use crate::controller::status::KubeStatusWriter;
use crate::controller::sync::SyncHandler;
use crate::controller::worker::Reconciler;
use crate::crd::CassandraCluster;
use crate::runtime::initialization::InitializationResult;
use anyhow::Result;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::reflector::Store;
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Queue name used for metrics labels
pub const QUEUE_NAME: &str = "cassandraclusters";

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

fn spawn_informer<K>(
    tasks: &mut JoinSet<()>,
    informer: Informer<K>,
    api: Api<K>,
    handler: Arc<dyn EventHandler<K>>,
    resync_period: Option<Duration>,
    shutdown: watch::Receiver<bool>,
) where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send + Sync,
{
    tasks.spawn(informer.run(
        api,
        watcher::Config::default(),
        handler,
        resync_period,
        shutdown,
    ));
}

async fn wait_until_ready<K>(store: Store<K>, kind: &str) -> Result<()>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone,
{
    store.wait_until_ready().await.map_err(|e| {
        warn!("Informer for {} stopped before its cache synced: {}", kind, e);
        anyhow::anyhow!("{kind} informer stopped before its cache synced: {e}")
    })
}

/// Run the controller until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if shutdown is requested before the caches synced.
pub async fn run_controller(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        config,
        server_state,
        server_handle,
        shutdown,
    } = init;

    let queue = Arc::new(WorkQueue::new(
        QUEUE_NAME,
        config.backoff_start_duration(),
        config.backoff_max_duration(),
    ));
    let namespace = config.watch_namespace.as_deref();
    let resync_period = config.resync_period();

    let clusters_informer = Informer::<CassandraCluster>::new();
    let statefulsets_informer = Informer::<StatefulSet>::new();
    let services_informer = Informer::<Service>::new();

    let clusters = clusters_informer.reader();
    let statefulsets = statefulsets_informer.reader();
    let services = services_informer.reader();

    let router = Arc::new(OwnershipRouter::new(clusters.clone(), queue.clone()));
    let cluster_handler: Arc<dyn EventHandler<CassandraCluster>> =
        Arc::new(ClusterEventHandler::new(queue.clone()));
    let statefulset_handler: Arc<dyn EventHandler<StatefulSet>> = router.clone();
    let service_handler: Arc<dyn EventHandler<Service>> = router;

    let mut informers = JoinSet::new();
    spawn_informer(
        &mut informers,
        clusters_informer,
        scoped_api(&client, namespace),
        cluster_handler,
        resync_period,
        shutdown.subscribe(),
    );
    spawn_informer(
        &mut informers,
        statefulsets_informer,
        scoped_api(&client, namespace),
        statefulset_handler,
        resync_period,
        shutdown.subscribe(),
    );
    spawn_informer(
        &mut informers,
        services_informer,
        scoped_api(&client, namespace),
        service_handler,
        resync_period,
        shutdown.subscribe(),
    );

    let handler = Arc::new(SyncHandler::new(
        clusters.clone(),
        Arc::new(KubeResourceManager::<StatefulSet>::new(client.clone())),
        Arc::new(KubeResourceManager::<Service>::new(client.clone())),
        Arc::new(KubeStatusWriter::new(client.clone())),
        Arc::new(KubeEventRecorder::new(
            client.clone(),
            std::env::var("POD_NAME").ok(),
        )),
    ));

    let ready_state = server_state.clone();
    let caches_synced = async move {
        tokio::try_join!(
            wait_until_ready(clusters, "CassandraCluster"),
            wait_until_ready(statefulsets, "StatefulSet"),
            wait_until_ready(services, "Service"),
        )?;
        info!("Informer caches synced");
        ready_state.set_ready(true);
        Ok::<(), anyhow::Error>(())
    };

    let result = Reconciler::new(queue, handler, config.workers)
        .run(caches_synced, shutdown.subscribe())
        .await;

    // Informers and the server stop on the same signal
    shutdown.trigger();
    server_state.set_ready(false);
    while let Some(joined) = informers.join_next().await {
        if let Err(e) = joined {
            error!("Informer task failed: {}", e);
        }
    }
    if let Err(e) = server_handle.await {
        error!("HTTP server task failed: {}", e);
    }

    info!("Controller stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_runtime::reflector::store::Writer;

    #[tokio::test]
    async fn test_dropped_writer_is_not_reported_as_synced() {
        let writer: Writer<CassandraCluster> = Writer::default();
        let store = writer.as_reader();
        drop(writer);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            wait_until_ready(store, "CassandraCluster"),
        )
        .await
        .expect("wait should resolve once the writer is dropped");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_synced_store_is_ready() {
        let mut writer: Writer<CassandraCluster> = Writer::default();
        let store = writer.as_reader();
        writer.apply_watcher_event(&watcher::Event::Init);
        writer.apply_watcher_event(&watcher::Event::InitDone);

        assert!(wait_until_ready(store, "CassandraCluster").await.is_ok());
    }
}

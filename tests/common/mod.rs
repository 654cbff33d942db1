//! Common test utilities for sync and worker tests
//!
//! In-memory fakes for the resource managers, the status writer and the event
//! recorder, plus builders for clusters and cached stores.

#![allow(dead_code, reason = "shared across test binaries")]

use anyhow::Result;
use async_trait::async_trait;
use cassandra_controller::controller::events::EventRecorder;
use cassandra_controller::controller::manager::ResourceManager;
use cassandra_controller::controller::status::StatusWriter;
use cassandra_controller::controller::sync::SyncHandler;
use cassandra_controller::crd::{CassandraCluster, CassandraClusterSpec, CassandraClusterStatus};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use kube_runtime::events::EventType;
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::Store;
use kube_runtime::watcher;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "db";
pub const CLUSTER: &str = "ring";
pub const KEY: &str = "db/ring";

pub fn cluster(statefulset_name: &str, replicas: Option<i32>) -> CassandraCluster {
    let mut cluster = CassandraCluster::new(
        CLUSTER,
        CassandraClusterSpec {
            statefulset_name: statefulset_name.to_string(),
            replicas,
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("uid-ring".to_string());
    cluster.metadata.resource_version = Some("1".to_string());
    cluster
}

pub fn with_status(mut cluster: CassandraCluster, current_replicas: i32) -> CassandraCluster {
    cluster.status = Some(CassandraClusterStatus { current_replicas });
    cluster
}

pub fn store(clusters: &[CassandraCluster]) -> Store<CassandraCluster> {
    let mut writer: Writer<CassandraCluster> = Writer::default();
    for cluster in clusters {
        writer.apply_watcher_event(&watcher::Event::Apply(cluster.clone()));
    }
    writer.as_reader()
}

/// In-memory [`ResourceManager`] that records every call
pub struct FakeManager<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    calls: Mutex<Vec<String>>,
    resource_version: AtomicU64,
    failing_gets: AtomicUsize,
    failing_creates: AtomicUsize,
    failing_updates: AtomicUsize,
    panic_on_get: AtomicBool,
}

impl<K> Default for FakeManager<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            resource_version: AtomicU64::new(100),
            failing_gets: AtomicUsize::new(0),
            failing_creates: AtomicUsize::new(0),
            failing_updates: AtomicUsize::new(0),
            panic_on_get: AtomicBool::new(false),
        }
    }
}

impl<K> FakeManager<K>
where
    K: Resource + Clone,
{
    pub fn insert(&self, obj: K) {
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn modify(&self, name: &str, change: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(&(NAMESPACE.to_string(), name.to_string()))
            .expect("object should exist");
        change(obj);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Create and update calls
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("get "))
            .collect()
    }

    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    pub fn panic_on_get(&self, panic: bool) {
        self.panic_on_get.store(panic, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn store_with_new_version(&self, namespace: &str, obj: &K) -> K {
        let mut stored = obj.clone();
        let version = self.resource_version.fetch_add(1, Ordering::SeqCst);
        stored.meta_mut().resource_version = Some(version.to_string());
        stored.meta_mut().namespace = Some(namespace.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), obj.name_any()), stored.clone());
        stored
    }
}

#[async_trait]
impl<K> ResourceManager<K> for FakeManager<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.record(format!("get {namespace}/{name}"));
        if self.panic_on_get.load(Ordering::SeqCst) {
            panic!("simulated panic while getting {namespace}/{name}");
        }
        if take_failure(&self.failing_gets) {
            anyhow::bail!("connection refused");
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        self.record(format!("create {namespace}/{}", obj.name_any()));
        if take_failure(&self.failing_creates) {
            anyhow::bail!("admission webhook denied the request");
        }
        Ok(self.store_with_new_version(namespace, obj))
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K> {
        self.record(format!("update {namespace}/{}", obj.name_any()));
        if take_failure(&self.failing_updates) {
            anyhow::bail!("the object has been modified");
        }
        Ok(self.store_with_new_version(namespace, obj))
    }
}

/// Consume one pending failure, if any
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct FakeStatusWriter {
    pub updates: Mutex<Vec<(String, String, CassandraClusterStatus)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl StatusWriter for FakeStatusWriter {
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CassandraClusterStatus,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("the object has been modified");
        }
        self.updates
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string(), status.clone()));
        Ok(())
    }
}

/// Recorded event: (type, reason, message)
pub type RecordedEvent = (String, String, String);

#[derive(Default)]
pub struct FakeRecorder {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl FakeRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|(event_type, _, _)| event_type == "Warning")
            .collect()
    }
}

#[async_trait]
impl EventRecorder for FakeRecorder {
    async fn publish(
        &self,
        _cluster: &CassandraCluster,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        self.events.lock().unwrap().push((
            format!("{event_type:?}"),
            reason.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}

/// A sync handler wired to fakes
pub struct Harness {
    pub handler: Arc<SyncHandler>,
    pub statefulsets: Arc<FakeManager<StatefulSet>>,
    pub services: Arc<FakeManager<Service>>,
    pub status: Arc<FakeStatusWriter>,
    pub recorder: Arc<FakeRecorder>,
}

impl Harness {
    pub fn new(clusters: &[CassandraCluster]) -> Self {
        let statefulsets = Arc::new(FakeManager::<StatefulSet>::default());
        let services = Arc::new(FakeManager::<Service>::default());
        let status = Arc::new(FakeStatusWriter::default());
        let recorder = Arc::new(FakeRecorder::default());
        let handler = Arc::new(SyncHandler::new(
            store(clusters),
            statefulsets.clone(),
            services.clone(),
            status.clone(),
            recorder.clone(),
        ));
        Self {
            handler,
            statefulsets,
            services,
            status,
            recorder,
        }
    }

    /// Create and update calls across both managers
    pub fn total_writes(&self) -> usize {
        self.statefulsets.writes().len() + self.services.writes().len()
    }

    pub fn total_calls(&self) -> usize {
        self.statefulsets.calls().len() + self.services.calls().len()
    }
}

//! # Informer
//!
//! Keeps a local cache of one kind in sync with the API server and turns watch
//! events into `on_add` / `on_update` / `on_delete` notifications.
//!
//! - Watch events are applied to a `kube_runtime` reflector store; handlers read
//!   the previous version from the store before it is overwritten.
//! - A re-list (`Init` .. `InitDone`) is diffed against the cache: listed objects
//!   become adds or updates, and cached objects missing from the list are reported
//!   as [`DeletedObject::Tombstone`] since their delete event was never seen.
//! - With a resync period set, every cached object is re-delivered as an update
//!   whose old and new versions are identical.

use crate::controller::key::ReconcileKey;
use crate::runtime::error_policy;
use futures::{pin_mut, StreamExt};
use kube::{Api, Resource};
use kube_runtime::reflector::{store::Writer, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, Instrument};

/// Payload of a delete notification
#[derive(Debug, Clone)]
pub enum DeletedObject<K> {
    /// The delete was observed on the watch
    Live(Arc<K>),
    /// The object vanished while the watch was disconnected
    Tombstone {
        key: String,
        last_known: Option<Arc<K>>,
    },
}

impl<K> DeletedObject<K> {
    /// The last known state of the deleted object, if any
    pub fn object(&self) -> Option<&Arc<K>> {
        match self {
            Self::Live(obj) => Some(obj),
            Self::Tombstone { last_known, .. } => last_known.as_ref(),
        }
    }
}

/// Receives change notifications for one kind
pub trait EventHandler<K>: Send + Sync {
    fn on_add(&self, obj: Arc<K>);

    /// `old` and `new` are the same object on a resync
    fn on_update(&self, old: Arc<K>, new: Arc<K>);

    fn on_delete(&self, obj: DeletedObject<K>);
}

/// Watch-backed cache of one kind
pub struct Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    kind: String,
    writer: Writer<K>,
    reader: Store<K>,
    /// Objects seen since the current re-list started
    relisted: Option<Vec<K>>,
}

impl<K> Default for Informer<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("kind", &self.kind)
            .field("cached", &self.reader.state().len())
            .field("relisting", &self.relisted.is_some())
            .finish_non_exhaustive()
    }
}

impl<K> Informer<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        let writer = Writer::default();
        let reader = writer.as_reader();
        Self {
            kind: K::kind(&K::DynamicType::default()).to_string(),
            writer,
            reader,
            relisted: None,
        }
    }

    /// Read handle on the cache. `Store::wait_until_ready` resolves after the first list.
    #[must_use]
    pub fn reader(&self) -> Store<K> {
        self.reader.clone()
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Watch `api` until `shutdown` flips to true, dispatching to `handler`
    pub async fn run(
        mut self,
        api: Api<K>,
        config: watcher::Config,
        handler: Arc<dyn EventHandler<K>>,
        resync_period: Option<Duration>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let span = tracing::info_span!("controller.informer", kind = %self.kind);
        async move {
            info!("Starting {} informer", self.kind);

            let stream = watcher(api, config).default_backoff();
            pin_mut!(stream);

            let mut resync = resync_period.map(|period| {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });

            while !*shutdown.borrow() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = next_resync(&mut resync) => {
                        self.resync(handler.as_ref());
                    }
                    event = stream.next() => match event {
                        Some(Ok(event)) => self.handle_event(event, handler.as_ref()),
                        Some(Err(e)) => {
                            error_policy::handle_watch_stream_error(&self.kind, &e.to_string());
                        }
                        None => break,
                    },
                }
            }

            info!("{} informer stopped", self.kind);
        }
        .instrument(span)
        .await;
    }

    /// Apply one watch event to the cache and notify `handler`
    pub fn handle_event(&mut self, event: watcher::Event<K>, handler: &dyn EventHandler<K>) {
        match &event {
            watcher::Event::Apply(obj) => {
                let obj_ref = ObjectRef::from_obj(obj);
                let old = self.reader.get(&obj_ref);
                self.writer.apply_watcher_event(&event);
                let new = self
                    .reader
                    .get(&obj_ref)
                    .unwrap_or_else(|| Arc::new(obj.clone()));
                match old {
                    Some(old) => handler.on_update(old, new),
                    None => handler.on_add(new),
                }
            }
            watcher::Event::Delete(obj) => {
                self.writer.apply_watcher_event(&event);
                handler.on_delete(DeletedObject::Live(Arc::new(obj.clone())));
            }
            watcher::Event::Init => {
                self.relisted = Some(Vec::new());
                self.writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) => {
                self.relisted.get_or_insert_with(Vec::new).push(obj.clone());
                self.writer.apply_watcher_event(&event);
            }
            watcher::Event::InitDone => {
                let mut previous: HashMap<ObjectRef<K>, Arc<K>> = self
                    .reader
                    .state()
                    .into_iter()
                    .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
                    .collect();
                self.writer.apply_watcher_event(&event);

                let relisted = self.relisted.take().unwrap_or_default();
                debug!(
                    "{} re-list complete: {} listed, {} previously cached",
                    self.kind,
                    relisted.len(),
                    previous.len()
                );
                for obj in relisted {
                    let obj_ref = ObjectRef::from_obj(&obj);
                    let new = self
                        .reader
                        .get(&obj_ref)
                        .unwrap_or_else(|| Arc::new(obj));
                    match previous.remove(&obj_ref) {
                        Some(old) => handler.on_update(old, new),
                        None => handler.on_add(new),
                    }
                }
                for (_, vanished) in previous {
                    handler.on_delete(DeletedObject::Tombstone {
                        key: ReconcileKey::for_object(vanished.as_ref()).to_string(),
                        last_known: Some(vanished),
                    });
                }
            }
        }
    }

    /// Re-deliver every cached object as an unchanged update
    pub fn resync(&self, handler: &dyn EventHandler<K>) {
        let state = self.reader.state();
        debug!("Resyncing {} cached {} objects", state.len(), self.kind);
        for obj in state {
            handler.on_update(obj.clone(), obj);
        }
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl Recording {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl EventHandler<Service> for Recording {
        fn on_add(&self, obj: Arc<Service>) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("add {}", obj.name_any()));
        }

        fn on_update(&self, old: Arc<Service>, new: Arc<Service>) {
            self.calls.lock().unwrap().push(format!(
                "update {} {}->{}",
                new.name_any(),
                old.resource_version().unwrap_or_default(),
                new.resource_version().unwrap_or_default()
            ));
        }

        fn on_delete(&self, obj: DeletedObject<Service>) {
            let entry = match obj {
                DeletedObject::Live(obj) => format!("delete {}", obj.name_any()),
                DeletedObject::Tombstone { key, last_known } => format!(
                    "tombstone {key} known={}",
                    last_known.is_some()
                ),
            };
            self.calls.lock().unwrap().push(entry);
        }
    }

    fn service(name: &str, resource_version: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("db".to_string()),
                resource_version: Some(resource_version.to_string()),
                ..ObjectMeta::default()
            },
            ..Service::default()
        }
    }

    fn initial_list(informer: &mut Informer<Service>, handler: &Recording, objs: &[Service]) {
        informer.handle_event(watcher::Event::Init, handler);
        for obj in objs {
            informer.handle_event(watcher::Event::InitApply(obj.clone()), handler);
        }
        informer.handle_event(watcher::Event::InitDone, handler);
    }

    #[test]
    fn test_initial_list_reports_adds() {
        let mut informer = Informer::<Service>::new();
        let handler = Recording::default();

        initial_list(&mut informer, &handler, &[service("a", "1"), service("b", "1")]);

        let mut calls = handler.take();
        calls.sort();
        assert_eq!(calls, vec!["add a", "add b"]);
        assert_eq!(informer.reader().state().len(), 2);
    }

    #[test]
    fn test_apply_reports_update_with_previous_version() {
        let mut informer = Informer::<Service>::new();
        let handler = Recording::default();
        initial_list(&mut informer, &handler, &[service("a", "1")]);
        handler.take();

        informer.handle_event(watcher::Event::Apply(service("a", "2")), &handler);
        informer.handle_event(watcher::Event::Apply(service("c", "5")), &handler);
        informer.handle_event(watcher::Event::Delete(service("c", "6")), &handler);

        assert_eq!(
            handler.take(),
            vec!["update a 1->2", "add c", "delete c"]
        );
    }

    #[test]
    fn test_relist_synthesizes_tombstones_for_vanished_objects() {
        let mut informer = Informer::<Service>::new();
        let handler = Recording::default();
        initial_list(&mut informer, &handler, &[service("a", "1"), service("b", "1")]);
        handler.take();

        initial_list(&mut informer, &handler, &[service("a", "3")]);

        assert_eq!(
            handler.take(),
            vec!["update a 1->3", "tombstone db/b known=true"]
        );
        assert_eq!(informer.reader().state().len(), 1);
    }

    #[test]
    fn test_resync_redelivers_cached_objects_unchanged() {
        let mut informer = Informer::<Service>::new();
        let handler = Recording::default();
        initial_list(&mut informer, &handler, &[service("a", "7")]);
        handler.take();

        informer.resync(&handler);

        assert_eq!(handler.take(), vec!["update a 7->7"]);
    }

    #[test]
    fn test_deleted_object_accessor() {
        let live = DeletedObject::Live(Arc::new(service("a", "1")));
        assert!(live.object().is_some());

        let tombstone: DeletedObject<Service> = DeletedObject::Tombstone {
            key: "db/a".to_string(),
            last_known: None,
        };
        assert!(tombstone.object().is_none());
    }
}

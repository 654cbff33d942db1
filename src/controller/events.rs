//! # Event Recording
//!
//! Kubernetes events published on `CassandraCluster` objects.

use crate::constants::CONTROLLER_NAME;
use crate::crd::CassandraCluster;
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};

/// Publishes events against a cluster object
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(
        &self,
        cluster: &CassandraCluster,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// [`EventRecorder`] backed by `kube_runtime`'s event recorder
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    /// `instance` is usually the pod name, when known
    #[must_use]
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        cluster: &CassandraCluster,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let event = Event {
            type_: event_type,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        self.recorder
            .publish(&event, &cluster.object_ref(&()))
            .await
            .with_context(|| format!("Failed to publish {reason} event"))?;
        metrics::increment_events_total(reason);
        Ok(())
    }
}

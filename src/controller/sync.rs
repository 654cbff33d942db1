//! # Sync Handler
//!
//! Drives one `CassandraCluster` toward its declared state. Each pass re-derives
//! everything from the cached cluster and the live derived resources, so running
//! it twice against unchanged state performs no writes.
//!
//! Order of work for a key:
//! 1. Resolve the key to a cached cluster and validate `spec.statefulsetName`
//! 2. Ensure the unready Service, the headless Service and the StatefulSet exist,
//!    refusing to adopt same-named resources controlled by someone else
//! 3. Replace the StatefulSet when its replica count drifted from the spec
//! 4. Copy `currentReplicas` into the cluster status when it changed

use crate::constants::{MESSAGE_RESOURCE_SYNCED, REASON_RESOURCE_EXISTS, REASON_SYNCED};
use crate::controller::error::SyncError;
use crate::controller::events::EventRecorder;
use crate::controller::key::ReconcileKey;
use crate::controller::manager::ResourceManager;
use crate::controller::owner::is_controlled_by;
use crate::controller::resources::{new_headless_service, new_stateful_set, new_unready_service};
use crate::controller::status::StatusWriter;
use crate::controller::validation::validate_statefulset_name;
use crate::crd::CassandraCluster;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use kube_runtime::events::EventType;
use kube_runtime::reflector::{ObjectRef, Store};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Why a key was dropped without converging anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidKey,
    NotFound,
    InvalidSpec,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::InvalidKey => "invalid key",
            Self::NotFound => "not found",
            Self::InvalidSpec => "invalid spec",
        };
        f.write_str(reason)
    }
}

/// Successful result of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    Skipped(SkipReason),
}

/// Collaborators the sync handler works through
pub struct SyncHandler {
    clusters: Store<CassandraCluster>,
    statefulsets: Arc<dyn ResourceManager<StatefulSet>>,
    services: Arc<dyn ResourceManager<Service>>,
    status: Arc<dyn StatusWriter>,
    recorder: Arc<dyn EventRecorder>,
}

impl fmt::Debug for SyncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandler")
            .field("cached_clusters", &self.clusters.state().len())
            .finish_non_exhaustive()
    }
}

impl SyncHandler {
    #[must_use]
    pub fn new(
        clusters: Store<CassandraCluster>,
        statefulsets: Arc<dyn ResourceManager<StatefulSet>>,
        services: Arc<dyn ResourceManager<Service>>,
        status: Arc<dyn StatusWriter>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            clusters,
            statefulsets,
            services,
            status,
            recorder,
        }
    }

    /// Converge the cluster named by `key`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when a derived resource call fails, when a derived
    /// resource is controlled by something else, or when the status update fails.
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome, SyncError> {
        let span = tracing::info_span!("controller.sync", key = %key);
        self.sync_key(key).instrument(span).await
    }

    async fn sync_key(&self, key: &str) -> Result<SyncOutcome, SyncError> {
        let Ok(parsed) = ReconcileKey::parse(key) else {
            error!("Invalid resource key: {}", key);
            return Ok(SyncOutcome::Skipped(SkipReason::InvalidKey));
        };

        let cluster_ref =
            ObjectRef::<CassandraCluster>::new(&parsed.name).within(&parsed.namespace);
        let Some(cluster) = self.clusters.get(&cluster_ref) else {
            info!("CassandraCluster '{}' in work queue no longer exists", key);
            return Ok(SyncOutcome::Skipped(SkipReason::NotFound));
        };

        if let Err(e) = validate_statefulset_name(&cluster.spec.statefulset_name) {
            warn!("Skipping CassandraCluster {}: {}", key, e);
            return Ok(SyncOutcome::Skipped(SkipReason::InvalidSpec));
        }

        let namespace = parsed.namespace.as_str();

        self.ensure(
            self.services.as_ref(),
            "Service",
            &cluster,
            namespace,
            new_unready_service(&cluster),
        )
        .await?;
        self.ensure(
            self.services.as_ref(),
            "Service",
            &cluster,
            namespace,
            new_headless_service(&cluster),
        )
        .await?;
        let statefulset = self
            .ensure(
                self.statefulsets.as_ref(),
                "StatefulSet",
                &cluster,
                namespace,
                new_stateful_set(&cluster),
            )
            .await?;

        let statefulset = self
            .correct_replicas(&cluster, namespace, statefulset)
            .await?;

        self.update_status(&cluster, &parsed, &statefulset).await?;

        self.publish(&cluster, EventType::Normal, REASON_SYNCED, MESSAGE_RESOURCE_SYNCED)
            .await;
        debug!("CassandraCluster {} synced", key);
        Ok(SyncOutcome::Synced)
    }

    /// Fetch the derived resource named like `desired`, creating it when absent
    async fn ensure<K>(
        &self,
        manager: &dyn ResourceManager<K>,
        kind: &'static str,
        cluster: &CassandraCluster,
        namespace: &str,
        desired: K,
    ) -> Result<K, SyncError>
    where
        K: Resource + Clone + Send + Sync + 'static,
    {
        let name = desired.name_any();
        let resource_error = |operation: &'static str, source: anyhow::Error| SyncError::Resource {
            kind,
            operation,
            namespace: namespace.to_string(),
            name: name.clone(),
            source,
        };

        let existing = manager
            .get(namespace, &name)
            .await
            .map_err(|e| resource_error("get", e))?;

        match existing {
            Some(existing) => {
                if !is_controlled_by(&existing, cluster) {
                    let message = format!(
                        "Resource {name:?} already exists and is not managed by CassandraCluster"
                    );
                    warn!("{}", message);
                    self.publish(cluster, EventType::Warning, REASON_RESOURCE_EXISTS, &message)
                        .await;
                    return Err(SyncError::ResourceExists {
                        kind,
                        namespace: namespace.to_string(),
                        name: name.clone(),
                    });
                }
                Ok(existing)
            }
            None => {
                info!("Creating {} {}/{}", kind, namespace, name);
                manager
                    .create(namespace, &desired)
                    .await
                    .map_err(|e| resource_error("create", e))
            }
        }
    }

    /// Replace the StatefulSet with the desired template when replicas drifted
    async fn correct_replicas(
        &self,
        cluster: &CassandraCluster,
        namespace: &str,
        statefulset: StatefulSet,
    ) -> Result<StatefulSet, SyncError> {
        let Some(desired_replicas) = cluster.spec.replicas else {
            return Ok(statefulset);
        };
        let actual_replicas = statefulset.spec.as_ref().and_then(|spec| spec.replicas);
        if actual_replicas == Some(desired_replicas) {
            return Ok(statefulset);
        }

        info!(
            "CassandraCluster {} replicas: {}, StatefulSet replicas: {:?}",
            cluster.name_any(),
            desired_replicas,
            actual_replicas
        );

        let mut desired = new_stateful_set(cluster);
        desired.metadata.resource_version = statefulset.resource_version();
        self.statefulsets
            .update(namespace, &desired)
            .await
            .map_err(|source| SyncError::Resource {
                kind: "StatefulSet",
                operation: "update",
                namespace: namespace.to_string(),
                name: desired.name_any(),
                source,
            })
    }

    async fn update_status(
        &self,
        cluster: &CassandraCluster,
        key: &ReconcileKey,
        statefulset: &StatefulSet,
    ) -> Result<(), SyncError> {
        let current = cluster.status.clone().unwrap_or_default();
        let current_replicas = statefulset
            .status
            .as_ref()
            .and_then(|status| status.current_replicas)
            .unwrap_or(0);
        let mut desired = current.clone();
        desired.current_replicas = current_replicas;
        if desired == current {
            return Ok(());
        }

        debug!(
            "Updating status of CassandraCluster {}: currentReplicas {} -> {}",
            key, current.current_replicas, desired.current_replicas
        );
        self.status
            .update_status(&key.namespace, &key.name, &desired)
            .await
            .map_err(|source| SyncError::Status {
                key: key.to_string(),
                source,
            })
    }

    async fn publish(
        &self,
        cluster: &CassandraCluster,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        if let Err(e) = self
            .recorder
            .publish(cluster, event_type, reason, message)
            .await
        {
            warn!("Failed to publish {} event: {:#}", reason, e);
        }
    }
}

//! # Status Writer
//!
//! Persists `CassandraCluster` status through the status subresource.

use crate::constants::CONTROLLER_NAME;
use crate::crd::{CassandraCluster, CassandraClusterStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of `namespace/name`
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CassandraClusterStatus,
    ) -> Result<()>;
}

/// [`StatusWriter`] that merge-patches the status subresource
pub struct KubeStatusWriter {
    client: Client,
}

impl std::fmt::Debug for KubeStatusWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusWriter").finish_non_exhaustive()
    }
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CassandraClusterStatus,
    ) -> Result<()> {
        let api: Api<CassandraCluster> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        match api
            .patch_status(
                name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                // Deleted while the sync was running
                debug!(
                    "CassandraCluster {}/{} was deleted during reconciliation, skipping status update",
                    namespace, name
                );
                Ok(())
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to patch status of CassandraCluster {namespace}/{name}")
            }),
        }
    }
}

//! # Sync Errors
//!
//! Failures a sync pass can return to the worker, and whether the key should be retried.

use thiserror::Error;

/// Error returned by [`crate::controller::sync::SyncHandler::sync`]
#[derive(Debug, Error)]
pub enum SyncError {
    /// A derived resource with the expected name exists but is controlled by something else
    #[error("{kind} {namespace}/{name} already exists and is not managed by CassandraCluster")]
    ResourceExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// A call against a derived resource failed
    #[error("failed to {operation} {kind} {namespace}/{name}: {source}")]
    Resource {
        kind: &'static str,
        operation: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Persisting the CassandraCluster status failed
    #[error("failed to update status of CassandraCluster {key}: {source}")]
    Status {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    /// Whether the key should be re-queued with backoff.
    ///
    /// Ownership conflicts persist until someone removes the foreign resource, so
    /// retrying them would only spin.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ResourceExists { .. })
    }

    /// Short label for metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ResourceExists { .. } => "resource-exists",
            Self::Resource { .. } => "resource-error",
            Self::Status { .. } => "status-error",
        }
    }
}

/// Error returned when a reconcile key cannot be split into namespace and name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid resource key: {0:?}")]
pub struct KeyError(pub String);

//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and optional CRD installation.

use crate::config::ControllerConfig;
use crate::observability;
use crate::runtime::crd_install::ensure_crd;
use crate::runtime::shutdown::{spawn_signal_handler, ShutdownSignal};
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    pub config: ControllerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub server_handle: JoinHandle<()>,
    /// Flips to true on SIGINT/SIGTERM
    pub shutdown: ShutdownSignal,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - CRD installation when `INSTALL_CRD` is set
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(&config);
    config.warn_invalid_values();

    info!("Starting Cassandra Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        "Configuration: workers={}, resync={}s, backoff={}ms..{}ms, namespace={}",
        config.workers,
        config.resync_period_secs,
        config.backoff_start_ms,
        config.backoff_max_ms,
        config.watch_namespace.as_deref().unwrap_or("<all>")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let shutdown = spawn_signal_handler(server_state.clone());

    let server_port = config.metrics_port;
    let server_state_clone = server_state.clone();
    let server_shutdown = shutdown.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    if config.install_crd {
        ensure_crd(&client, config.crd_establish_timeout())
            .await
            .context("Failed to install CassandraCluster CRD")?;
    }

    info!("Controller initialized, starting informers...");

    Ok(InitializationResult {
        client,
        config,
        server_state,
        server_handle,
        shutdown,
    })
}

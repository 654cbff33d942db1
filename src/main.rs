//! # Cassandra Controller
//!
//! Watches `CassandraCluster` resources and keeps a StatefulSet and two headless
//! Services in line with each of them.
//!
//! ## Features
//!
//! - **Level-triggered**: every pass re-derives the full desired state
//! - **Ownership-aware**: derived resources controlled by something else are never adopted
//! - **Per-key backoff**: failed keys retry with capped exponential delays
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use cassandra_controller::runtime::initialization::initialize;
use cassandra_controller::runtime::watch_loop::run_controller;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_controller(init).await
}

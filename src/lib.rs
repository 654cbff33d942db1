//! # Cassandra Controller
//!
//! A Kubernetes controller that runs Cassandra rings declared as `CassandraCluster`
//! custom resources. Each cluster is realized as a StatefulSet plus two headless
//! Services, and the StatefulSet's `currentReplicas` is reported back in the status.
//!
//! ## Modules
//!
//! - `config`: environment-driven controller configuration
//! - `constants`: defaults, event reasons and naming conventions
//! - `controller`: the reconciliation engine (informers, queue, workers, sync)
//! - `crd`: the `CassandraCluster` custom resource
//! - `observability`: logging and Prometheus metrics
//! - `runtime`: startup, wiring and shutdown
//! - `server`: HTTP metrics and probe endpoints

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;

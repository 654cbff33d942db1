//! # Controller
//!
//! Reconciliation engine for `CassandraCluster` resources.
//!
//! - `informer`: watch-backed caches and change notifications
//! - `router`: maps change notifications to queue keys
//! - `queue`: deduplicating, rate-limited work queue
//! - `backoff`: per-key exponential backoff
//! - `worker`: worker pool draining the queue
//! - `sync`: convergence of one cluster
//! - `manager`, `status`, `events`: API façades used by `sync`
//! - `resources`: desired StatefulSet and Service templates

pub mod backoff;
pub mod error;
pub mod events;
pub mod informer;
pub mod key;
pub mod manager;
pub mod owner;
pub mod queue;
pub mod resources;
pub mod router;
pub mod status;
pub mod sync;
pub mod validation;
pub mod worker;

//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used for the event reporter, field manager and log target
pub const CONTROLLER_NAME: &str = "cassandra-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of worker loops draining the work queue
pub const DEFAULT_WORKERS: usize = 2;

/// Default informer resync period (seconds)
/// Every cached object is re-delivered as an update on this interval
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Default per-key exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 5;

/// Default per-key exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// Default time to wait for an applied CRD to become Established (seconds)
pub const DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS: u64 = 30;

/// Event reason emitted when a CassandraCluster was synced
pub const REASON_SYNCED: &str = "Synced";

/// Event reason emitted when a derived resource exists but is owned by someone else
pub const REASON_RESOURCE_EXISTS: &str = "ErrResourceExists";

/// Event message for a successful sync
pub const MESSAGE_RESOURCE_SYNCED: &str = "CassandraCluster synced successfully";

/// Suffix of the headless Service that publishes not-ready pods
pub const UNREADY_SERVICE_SUFFIX: &str = "-unready";

//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;
use tracing::warn;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of worker loops draining the work queue
    pub workers: usize,
    /// Informer resync period (seconds), 0 disables periodic resync
    pub resync_period_secs: u64,
    /// Per-key exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Per-key exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Restrict watches to a single namespace. `None` watches all namespaces.
    pub watch_namespace: Option<String>,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Server-side apply the CassandraCluster CRD on startup
    pub install_crd: bool,
    /// How long to wait for an applied CRD to become Established (seconds)
    pub crd_establish_timeout_secs: u64,
    /// Default log level when `RUST_LOG` is not set (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Variables whose values could not be parsed and were replaced by defaults
    pub invalid_values: Vec<(String, String)>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS,
            DEFAULT_METRICS_PORT, DEFAULT_RESYNC_PERIOD_SECS, DEFAULT_WORKERS,
        };
        Self {
            workers: DEFAULT_WORKERS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            install_crd: false,
            crd_establish_timeout_secs: DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            invalid_values: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults and are listed in
    /// `invalid_values`. Config is read before the tracing subscriber exists, so
    /// call [`ControllerConfig::warn_invalid_values`] once logging is up.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut env = EnvReader {
            lookup,
            invalid: Vec::new(),
        };
        Self {
            workers: env.parse_or("WORKERS", defaults.workers).max(1),
            resync_period_secs: env.parse_or("RESYNC_PERIOD_SECS", defaults.resync_period_secs),
            backoff_start_ms: env.parse_or("BACKOFF_START_MS", defaults.backoff_start_ms),
            backoff_max_ms: env.parse_or("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            watch_namespace: env
                .get("WATCH_NAMESPACE")
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty()),
            metrics_port: env.parse_or("METRICS_PORT", defaults.metrics_port),
            install_crd: env.bool_or("INSTALL_CRD", defaults.install_crd),
            crd_establish_timeout_secs: env.parse_or(
                "CRD_ESTABLISH_TIMEOUT_SECS",
                defaults.crd_establish_timeout_secs,
            ),
            log_level: env.get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env.get("LOG_FORMAT").unwrap_or(defaults.log_format),
            invalid_values: env.invalid,
        }
    }

    /// Log every value that was replaced by its default
    pub fn warn_invalid_values(&self) {
        for (key, value) in &self.invalid_values {
            warn!("Invalid value {:?} for {}, using default", value, key);
        }
    }

    /// Get resync period, `None` when periodic resync is disabled
    #[must_use]
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_secs > 0).then(|| Duration::from_secs(self.resync_period_secs))
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get CRD establish timeout duration
    #[must_use]
    pub fn crd_establish_timeout(&self) -> Duration {
        Duration::from_secs(self.crd_establish_timeout_secs)
    }

    /// Whether logs should be emitted as JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

struct EnvReader<F> {
    lookup: F,
    invalid: Vec<(String, String)>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    /// Read a value or return the default when missing or unparseable
    fn parse_or<T: std::str::FromStr>(&mut self, key: &str, default: T) -> T {
        let Some(value) = self.get(key) else {
            return default;
        };
        if let Ok(parsed) = value.trim().parse() {
            parsed
        } else {
            self.invalid.push((key.to_string(), value));
            default
        }
    }

    fn bool_or(&mut self, key: &str, default: bool) -> bool {
        let Some(value) = self.get(key) else {
            return default;
        };
        if let Some(parsed) = parse_bool(&value) {
            parsed
        } else {
            self.invalid.push((key.to_string(), value));
            default
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` wins over the configured `LOG_LEVEL`;
//! `LOG_FORMAT=json` switches to structured JSON output.

use crate::config::ControllerConfig;
use tracing_subscriber::EnvFilter;

/// Default filter directive derived from the configured log level
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    format!("cassandra_controller={level},kube=warn")
}

/// Install the global tracing subscriber
///
/// Fails quietly when a subscriber is already installed (e.g. in tests).
pub fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let result = if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

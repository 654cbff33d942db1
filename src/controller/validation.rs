//! # Validation
//!
//! Checks on `CassandraCluster` spec fields before any derived resource is touched.

use crate::constants::UNREADY_SERVICE_SUFFIX;
use anyhow::Result;
use regex::Regex;

/// Longest DNS-1123 label
const MAX_LABEL_LENGTH: usize = 63;

/// Validate `spec.statefulsetName`
///
/// The name is used verbatim for the StatefulSet and the headless Service, and with
/// the `-unready` suffix for the second Service, so it must be an RFC 1123 label
/// that still fits once suffixed.
///
/// # Errors
///
/// Returns an error describing the first violated rule.
pub fn validate_statefulset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("statefulsetName cannot be empty"));
    }

    let max_length = MAX_LABEL_LENGTH - UNREADY_SERVICE_SUFFIX.len();
    if name.len() > max_length {
        return Err(anyhow::anyhow!(
            "statefulsetName '{}' exceeds maximum length of {} characters (got {})",
            name,
            max_length,
            name.len()
        ));
    }

    // RFC 1123 label: [a-z0-9]([-a-z0-9]*[a-z0-9])?
    let label_regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !label_regex.is_match(name) {
        return Err(anyhow::anyhow!(
            "statefulsetName '{name}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens; cannot start/end with hyphen)"
        ));
    }

    Ok(())
}

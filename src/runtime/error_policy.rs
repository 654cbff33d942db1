//! # Error Policy
//!
//! Classification and logging of watch stream errors. Restarting the stream is
//! left to `WatchStreamExt::default_backoff`; this module only decides how loudly
//! to report each failure.

use crate::constants::CONTROLLER_NAME;
use tracing::{error, warn};

/// Watch failure classes the controller reports differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401, RBAC revoked or token expired
    Unauthorized,
    /// 410, resource version too old; the watcher re-lists
    Expired,
    /// 429, API server storage (re)initializing
    TooManyRequests,
    /// 404, usually a missing CRD
    NotFound,
    Other,
}

impl WatchErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "401",
            Self::Expired => "410",
            Self::TooManyRequests => "429",
            Self::NotFound => "404",
            Self::Other => "other",
        }
    }
}

/// Classify a watch error from its rendered message
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    // 404 first: a plain-text 404 body surfaces as a serde error mentioning WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorClass::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorClass::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorClass::TooManyRequests;
    }
    WatchErrorClass::Other
}

/// Log a watch stream error for `kind` with diagnostics matching its class
pub fn handle_watch_stream_error(kind: &str, error_string: &str) -> WatchErrorClass {
    let class = classify_watch_error(error_string);
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        kind = %kind,
        error_type = class.as_str(),
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match class {
        WatchErrorClass::Unauthorized => {
            error!(
                "❌ {} watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired",
                kind
            );
            error!("🔍 SRE Diagnostics:");
            error!("   1. Verify the ClusterRole still exists:");
            error!("      kubectl get clusterrole {}", CONTROLLER_NAME);
            error!("   2. Verify the ClusterRoleBinding still binds the ServiceAccount:");
            error!("      kubectl get clusterrolebinding {} -o yaml", CONTROLLER_NAME);
            error!("   3. Verify RBAC permissions are still active:");
            error!(
                "      kubectl auth can-i watch {} --as=system:serviceaccount:<namespace>:{}",
                kind.to_ascii_lowercase(),
                CONTROLLER_NAME
            );
            error!("   4. If RBAC was recently changed, restart the controller pod");
        }
        WatchErrorClass::Expired => {
            warn!(
                "{} watch resource version expired (410) - watch will re-list",
                kind
            );
        }
        WatchErrorClass::TooManyRequests => {
            warn!(
                "API server storage reinitializing (429) while watching {}, backing off",
                kind
            );
        }
        WatchErrorClass::NotFound => {
            warn!(
                "{} not found (404) - the CRD may be missing. Error: {}",
                kind, error_string
            );
        }
        WatchErrorClass::Other => {
            error!("{} watch stream error: {}", kind, error_string);
        }
    }
    class
}

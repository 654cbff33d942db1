//! # Runtime
//!
//! Process startup, wiring and shutdown.

pub mod crd_install;
pub mod error_policy;
pub mod initialization;
pub mod shutdown;
pub mod watch_loop;

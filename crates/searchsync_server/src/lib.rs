//! # searchsync Server
//!
//! Control plane for the replication engine.
//!
//! This crate provides:
//! - [`SyncMonitor`]: owns and wires every subsystem between one source
//!   store and one search index
//! - Lifecycle handlers (start, stop, status)
//! - Manual triggers for flush, reconciliation, drift check and full
//!   sync, independent of the timers
//!
//! # Architecture
//!
//! The monitor is transport-agnostic: an embedding application exposes
//! its handlers over whatever surface it already has (HTTP routes, an
//! admin socket, a CLI). Each handler returns a serializable report, so
//! mapping to a wire format is a `serde_json::to_value` away.
//!
//! ```rust,ignore
//! use searchsync_server::{MonitorConfig, SyncMonitor};
//! use std::sync::Arc;
//!
//! let monitor = SyncMonitor::new(source, index, MonitorConfig::from_env());
//! monitor.start().await?;
//! // ... expose monitor.status(), monitor.trigger_reconcile(), ...
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod monitor;

pub use config::MonitorConfig;
pub use error::{ServerError, ServerResult};
pub use monitor::{MonitorStatus, SyncMonitor};

//! # searchsync Core
//!
//! Shared data model and plumbing for the searchsync replication engine.
//!
//! This crate provides:
//! - Document and change-event types (the join key between both stores)
//! - The error taxonomy with retryable classification
//! - A bounded retry-with-backoff utility
//! - Per-subsystem statistics (single writer, concurrent readers)
//! - The configuration surface with environment loading
//!
//! ## Key Invariants
//!
//! - The document identifier is the immutable join key between source
//!   and target
//! - Upserts are idempotent; redelivery of the same event converges to
//!   the same target state
//! - Statistics are written by exactly one subsystem and readable at any
//!   time without locking

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod document;
mod error;
mod retry;
mod stats;

pub use config::SyncSettings;
pub use document::{
    ChangeEvent, ChangeOperation, Document, DocumentId, PendingOperation,
};
pub use error::{SyncError, SyncResult};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use stats::{now_millis, StatsSnapshot, SubsystemStats};

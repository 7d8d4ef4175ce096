//! # searchsync Engine
//!
//! The replication and reconciliation engine keeping a search-index
//! replica consistent with its authoritative document store.
//!
//! This crate provides:
//! - [`BatchProcessor`]: size/byte-bounded batching with bounded retry
//!   and re-queue on failure
//! - [`ChangeFeedConsumer`]: the continuous path, draining the source
//!   change feed with automatic reopen after interruptions
//! - [`FullSyncDriver`]: paginated whole-collection catch-up
//! - [`DriftDetector`]: cheap count comparison with threshold-triggered
//!   full sync
//! - [`ReconciliationEngine`]: identifier-level diffing and targeted
//!   repair of missing documents
//! - [`PeriodicTask`]: the scheduled-task abstraction driving the
//!   timer-based subsystems
//!
//! ## Key Invariants
//!
//! - Delivery is at-least-once; the target's merge upsert makes
//!   redelivery idempotent
//! - Event-stream delivery is best-effort: feed reopen after an
//!   interruption may introduce a gap, which reconciliation heals
//! - Per-id ordering is preserved from feed delivery through flush;
//!   cross-id ordering is not guaranteed
//! - The source is authoritative: reconciliation repairs missing target
//!   documents but never deletes on drift
//! - No timer-driven subsystem error terminates the process

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod consumer;
mod drift;
mod full_sync;
mod reconcile;
mod scheduler;

pub use batch::{BatchProcessor, ProcessorState};
pub use consumer::ChangeFeedConsumer;
pub use drift::{DriftDetector, DriftReport};
pub use full_sync::FullSyncDriver;
pub use reconcile::{ReconciliationEngine, ReconciliationReport};
pub use scheduler::PeriodicTask;

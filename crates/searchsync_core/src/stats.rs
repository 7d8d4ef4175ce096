//! Per-subsystem statistics.
//!
//! Each subsystem owns one [`SubsystemStats`] instance and is its only
//! writer; status queries read concurrently via [`SubsystemStats::snapshot`].
//! All counters are atomic, so reads never block the owning subsystem.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall clock as milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Counters and timestamps published by one subsystem.
#[derive(Debug, Default)]
pub struct SubsystemStats {
    /// Operations handled successfully.
    processed: AtomicU64,
    /// Operations that failed permanently (after retries where applicable).
    errors: AtomicU64,
    /// Events skipped (e.g. update with no resolvable document).
    skipped: AtomicU64,
    /// Documents repaired or re-synced.
    synced: AtomicU64,
    /// Millisecond timestamp of the last check, 0 if never.
    last_check: AtomicU64,
    /// Millisecond timestamp of the last successful sync, 0 if never.
    last_sync: AtomicU64,
}

impl SubsystemStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records successfully handled operations.
    pub fn record_processed(&self, count: u64) {
        self.processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Records permanently failed operations.
    pub fn record_errors(&self, count: u64) {
        self.errors.fetch_add(count, Ordering::Relaxed);
    }

    /// Records skipped events.
    pub fn record_skipped(&self, count: u64) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Records repaired documents.
    pub fn record_synced(&self, count: u64) {
        self.synced.fetch_add(count, Ordering::Relaxed);
    }

    /// Marks the time of a completed check.
    pub fn mark_check(&self) {
        self.last_check.store(now_millis(), Ordering::Relaxed);
    }

    /// Marks the time of a completed sync.
    pub fn mark_sync(&self) {
        self.last_sync.store(now_millis(), Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            last_check: nonzero(self.last_check.load(Ordering::Relaxed)),
            last_sync: nonzero(self.last_sync.load(Ordering::Relaxed)),
        }
    }
}

fn nonzero(v: u64) -> Option<u64> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

/// A point-in-time copy of one subsystem's statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Operations handled successfully.
    pub processed: u64,
    /// Operations that failed permanently.
    pub errors: u64,
    /// Events skipped.
    pub skipped: u64,
    /// Documents repaired or re-synced.
    pub synced: u64,
    /// Millisecond timestamp of the last check, if any.
    pub last_check: Option<u64>,
    /// Millisecond timestamp of the last successful sync, if any.
    pub last_sync: Option<u64>,
}

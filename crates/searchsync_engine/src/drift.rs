//! Drift detector: cheap count comparison between the two stores.

use crate::full_sync::FullSyncDriver;
use searchsync_core::{StatsSnapshot, SubsystemStats, SyncResult, SyncSettings};
use searchsync_store::{SearchIndex, SourceStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one count comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Documents in the source store.
    pub source_count: u64,
    /// Documents in the search index.
    pub target_count: u64,
    /// `source_count - target_count`.
    pub difference: i64,
    /// Whether the counts agree.
    pub is_match: bool,
}

/// Periodically compares aggregate document counts and escalates large
/// divergence to a full sync.
///
/// The comparison is O(1) against both stores, so it can run on a long
/// period without load concerns. It is a coarse safety net behind the
/// reconciliation engine; the diagnostic sample it logs on mismatch is
/// for operators, not a correctness mechanism.
pub struct DriftDetector<S: SourceStore, T: SearchIndex> {
    source: Arc<S>,
    index: Arc<T>,
    full_sync: Arc<FullSyncDriver<S, T>>,
    threshold: u64,
    sample_size: usize,
    post_sync_check_delay: Duration,
    stats: SubsystemStats,
}

impl<S: SourceStore, T: SearchIndex> DriftDetector<S, T> {
    /// Creates a detector escalating to the given full sync driver.
    pub fn new(
        source: Arc<S>,
        index: Arc<T>,
        full_sync: Arc<FullSyncDriver<S, T>>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            source,
            index,
            full_sync,
            threshold: settings.auto_sync_threshold,
            sample_size: settings.diag_sample_size,
            post_sync_check_delay: settings.post_sync_check_delay,
            stats: SubsystemStats::new(),
        }
    }

    /// Compares the raw document counts of both stores.
    ///
    /// On mismatch, logs a bounded diagnostic sample; when the absolute
    /// difference exceeds the configured threshold, triggers a full sync
    /// asynchronously and schedules a follow-up count check. A failed
    /// trigger is logged and does not affect the detector's own timer.
    pub async fn check_counts(&self) -> SyncResult<DriftReport> {
        let source_count = self.source.count().await?;
        let target_count = self.index.count().await?;
        self.stats.mark_check();
        self.stats.record_processed(1);

        let difference = source_count as i64 - target_count as i64;
        let report = DriftReport {
            source_count,
            target_count,
            difference,
            is_match: difference == 0,
        };

        if report.is_match {
            debug!(count = source_count, "document counts match");
            return Ok(report);
        }

        warn!(
            source_count,
            target_count, difference, "document counts diverged"
        );
        self.diagnose_sample().await;

        if difference.unsigned_abs() > self.threshold {
            warn!(
                difference,
                threshold = self.threshold,
                "divergence exceeds threshold, triggering full sync"
            );
            self.trigger_full_sync();
            self.schedule_followup_check();
        }

        Ok(report)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Logs whether a bounded sample of source documents exists in the
    /// index, to aid diagnosis of which side is behind.
    async fn diagnose_sample(&self) {
        let sample = match self.source.find_page(0, self.sample_size).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "drift diagnosis sample fetch failed");
                return;
            }
        };

        for document in sample {
            match self.index.exists(&document.id).await {
                Ok(true) => debug!(id = %document.id, "sample document present in index"),
                Ok(false) => warn!(id = %document.id, "sample document missing from index"),
                Err(e) => {
                    warn!(error = %e, "drift diagnosis existence check failed");
                    return;
                }
            }
        }
    }

    fn trigger_full_sync(&self) {
        let full_sync = Arc::clone(&self.full_sync);
        tokio::spawn(async move {
            if let Err(e) = full_sync.run().await {
                error!(error = %e, "threshold-triggered full sync failed");
            }
        });
    }

    fn schedule_followup_check(&self) {
        let source = Arc::clone(&self.source);
        let index = Arc::clone(&self.index);
        let delay = self.post_sync_check_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match (source.count().await, index.count().await) {
                (Ok(s), Ok(t)) if s == t => {
                    info!(count = s, "counts converged after full sync");
                }
                (Ok(s), Ok(t)) => {
                    warn!(difference = s as i64 - t as i64, "counts still diverged after full sync");
                }
                _ => warn!("post-sync count check failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchsync_core::Document;
    use searchsync_store::{MemoryIndex, MemorySource};
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::from_value(id, json!({"n": 1}))
    }

    fn detector(
        source: Arc<MemorySource>,
        index: Arc<MemoryIndex>,
        threshold: u64,
    ) -> DriftDetector<MemorySource, MemoryIndex> {
        let settings = SyncSettings::default()
            .without_delays()
            .with_auto_sync_threshold(threshold);
        let full_sync = Arc::new(FullSyncDriver::new(
            Arc::clone(&source),
            Arc::clone(&index),
            &settings,
        ));
        DriftDetector::new(source, index, full_sync, &settings)
    }

    #[tokio::test]
    async fn matching_counts_are_a_noop() {
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        for i in 0..5 {
            let d = doc(&format!("d{i}"));
            source.put_silent(d.clone());
            index.seed(d);
        }

        let det = detector(Arc::clone(&source), Arc::clone(&index), 2);
        let report = det.check_counts().await.unwrap();

        assert!(report.is_match);
        assert_eq!(report.difference, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(index.bulk_calls(), 0);
    }

    #[tokio::test]
    async fn small_divergence_does_not_trigger_full_sync() {
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        for i in 0..5 {
            source.put_silent(doc(&format!("d{i}")));
        }

        let det = detector(Arc::clone(&source), Arc::clone(&index), 10);
        let report = det.check_counts().await.unwrap();

        assert!(!report.is_match);
        assert_eq!(report.difference, 5);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(index.bulk_calls(), 0);
    }

    #[tokio::test]
    async fn large_divergence_triggers_full_sync() {
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        for i in 0..20 {
            source.put_silent(doc(&format!("d{i:02}")));
        }

        let det = detector(Arc::clone(&source), Arc::clone(&index), 5);
        let report = det.check_counts().await.unwrap();
        assert_eq!(report.difference, 20);

        // The triggered full sync runs in the background.
        for _ in 0..50 {
            if index.len() == 20 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(index.len(), 20);

        let followup = det.check_counts().await.unwrap();
        assert!(followup.is_match);
    }

    #[tokio::test]
    async fn orphaned_target_reports_negative_difference() {
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        for i in 0..3 {
            index.seed(doc(&format!("orphan-{i}")));
        }

        let det = detector(Arc::clone(&source), Arc::clone(&index), 10);
        let report = det.check_counts().await.unwrap();

        assert_eq!(report.difference, -3);
        assert!(!report.is_match);
        // Nothing is deleted from the target on drift.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_error() {
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        source.set_unreachable(true);

        let det = detector(source, index, 5);
        assert!(det.check_counts().await.is_err());
    }
}

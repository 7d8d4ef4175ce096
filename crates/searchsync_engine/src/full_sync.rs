//! Full sync driver: paginated whole-collection catch-up.

use searchsync_core::{
    retry_with_backoff, StatsSnapshot, SubsystemStats, SyncResult, SyncSettings,
};
use searchsync_store::{BulkReport, SearchIndex, SourceStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pages logged between progress lines.
const PROGRESS_EVERY: u64 = 10;

/// Paginates the entire source collection and bulk-applies it to the
/// index. Used for bootstrap and for large-scale catch-up when drift
/// exceeds the repair threshold.
///
/// Pages go directly to the index, bypassing the batch processor, so a
/// long run cannot grow the processor queue without bound. Skip/limit
/// paging over a live collection can skip or repeat documents while
/// writes race the scan; that residue is healed by reconciliation.
pub struct FullSyncDriver<S: SourceStore, T: SearchIndex> {
    source: Arc<S>,
    index: Arc<T>,
    page_size: usize,
    page_delay: Duration,
    retry: searchsync_core::RetryPolicy,
    stats: SubsystemStats,
}

impl<S: SourceStore, T: SearchIndex> FullSyncDriver<S, T> {
    /// Creates a driver between the given stores.
    pub fn new(source: Arc<S>, index: Arc<T>, settings: &SyncSettings) -> Self {
        Self {
            source,
            index,
            page_size: settings.full_sync_page_size.max(1),
            page_delay: settings.full_sync_page_delay,
            retry: settings.retry.clone(),
            stats: SubsystemStats::new(),
        }
    }

    /// Runs a full sync with the configured page size.
    pub async fn run(&self) -> SyncResult<BulkReport> {
        self.run_with(self.page_size).await
    }

    /// Runs a full sync with an explicit page size.
    ///
    /// A page-level index failure adds the page size to the error count
    /// and continues with the next page: a full sync makes best-effort
    /// forward progress even under partial backend unavailability. Only
    /// a source read that fails through its retries aborts the run.
    pub async fn run_with(&self, page_size: usize) -> SyncResult<BulkReport> {
        let page_size = page_size.max(1);
        let mut report = BulkReport::default();
        let mut skip = 0u64;
        let mut pages = 0u64;

        info!(page_size, "full sync started");
        self.stats.mark_check();

        loop {
            let source = &self.source;
            let page = retry_with_backoff(&self.retry, "full sync page read", || async {
                source.find_page(skip, page_size).await
            })
            .await?;

            if page.is_empty() {
                break;
            }
            let page_len = page.len() as u64;

            match self.index.bulk_upsert(&page).await {
                Ok(page_report) => report.merge(page_report),
                Err(e) => {
                    warn!(error = %e, skip, "full sync page failed, continuing");
                    report.errors += page_len;
                }
            }

            skip += page_len;
            pages += 1;
            if pages % PROGRESS_EVERY == 0 {
                info!(
                    pages,
                    processed = report.processed,
                    errors = report.errors,
                    "full sync progress"
                );
            }

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        self.stats.record_processed(report.processed);
        self.stats.record_errors(report.errors);
        self.stats.record_synced(report.processed);
        self.stats.mark_sync();

        info!(
            pages,
            processed = report.processed,
            errors = report.errors,
            version_conflicts = report.version_conflicts,
            success_rate = report.success_rate(),
            "full sync finished"
        );
        Ok(report)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

//! Batch processor: accumulates change operations and applies them to
//! the search index in bounded bulk requests.

use crate::scheduler::PeriodicTask;
use parking_lot::Mutex;
use searchsync_core::{
    retry_with_backoff, Document, DocumentId, PendingOperation, RetryPolicy, StatsSnapshot,
    SubsystemStats, SyncSettings,
};
use searchsync_store::{BulkReport, SearchIndex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Observable processor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// No pending operations, no flush in progress.
    Idle,
    /// Operations queued below the flush threshold.
    Accumulating,
    /// A flush pass is applying a batch to the index.
    Flushing,
}

/// Accumulates individual change operations into size- and byte-bounded
/// batches and applies them to the search index with bounded retry.
///
/// The pending queue preserves enqueue order, so operations on a single
/// document id are applied in feed-delivery order. Only one flush pass
/// runs at a time; a flush requested during an active flush is a no-op
/// and the next tick or threshold crossing picks up newly queued items.
pub struct BatchProcessor<T: SearchIndex> {
    index: Arc<T>,
    batch_size: usize,
    max_batch_bytes: usize,
    retry: RetryPolicy,
    queue: Mutex<VecDeque<PendingOperation>>,
    queued_bytes: AtomicUsize,
    flushing: AtomicBool,
    stats: SubsystemStats,
}

impl<T: SearchIndex> BatchProcessor<T> {
    /// Creates a processor writing to the given index.
    pub fn new(index: Arc<T>, settings: &SyncSettings) -> Self {
        Self {
            index,
            batch_size: settings.batch_size.max(1),
            max_batch_bytes: settings.max_batch_bytes.max(1),
            retry: settings.retry.clone(),
            queue: Mutex::new(VecDeque::new()),
            queued_bytes: AtomicUsize::new(0),
            flushing: AtomicBool::new(false),
            stats: SubsystemStats::new(),
        }
    }

    /// Queues an upsert; flushes first if a bound is crossed.
    pub async fn add(&self, document: Document) {
        self.enqueue(PendingOperation::Upsert(document)).await;
    }

    /// Queues a delete by identifier.
    pub async fn add_delete(&self, id: DocumentId) {
        self.enqueue(PendingOperation::Delete(id)).await;
    }

    /// Queues multiple upserts, flushing between threshold crossings.
    pub async fn add_many(&self, documents: Vec<Document>) {
        for document in documents {
            self.enqueue(PendingOperation::Upsert(document)).await;
        }
    }

    /// Number of operations waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Current processor state.
    pub fn state(&self) -> ProcessorState {
        if self.flushing.load(Ordering::SeqCst) {
            ProcessorState::Flushing
        } else if self.queue.lock().is_empty() {
            ProcessorState::Idle
        } else {
            ProcessorState::Accumulating
        }
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Flushes one batch of pending operations.
    ///
    /// An empty queue, or a flush arriving while another is active, is a
    /// no-op returning a zero report. Exhausted retries re-queue the
    /// whole batch at the front of the queue and surface as error counts,
    /// never as a panic or error return.
    pub async fn flush(&self) -> BulkReport {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return BulkReport::default();
        }
        let report = self.flush_detached().await;
        self.flushing.store(false, Ordering::SeqCst);
        report
    }

    /// Flushes repeatedly until the queue is empty or a batch makes no
    /// progress. Used on shutdown to drain everything accumulated.
    pub async fn drain(&self) -> BulkReport {
        let mut total = BulkReport::default();
        loop {
            if self.pending_len() == 0 {
                break;
            }
            let report = self.flush().await;
            let progressed = report.processed > 0 || report.version_conflicts > 0;
            total.merge(report);
            if !progressed {
                break;
            }
        }
        total
    }

    /// Spawns the periodic flush timer that bounds worst-case staleness
    /// of accumulated operations.
    pub fn spawn_periodic_flush(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let processor = Arc::clone(self);
        PeriodicTask::spawn("batch-flush", Duration::ZERO, interval, move || {
            let processor = Arc::clone(&processor);
            async move {
                processor.flush().await;
                Ok(())
            }
        })
    }

    async fn enqueue(&self, operation: PendingOperation) {
        let bytes = operation.estimated_bytes();
        self.queue.lock().push_back(operation);
        self.queued_bytes.fetch_add(bytes, Ordering::SeqCst);

        let over_count = self.pending_len() >= self.batch_size;
        let over_bytes = self.queued_bytes.load(Ordering::SeqCst) >= self.max_batch_bytes;
        if over_count || over_bytes {
            self.flush().await;
        }
    }

    async fn flush_detached(&self) -> BulkReport {
        let (batch, batch_bytes) = self.detach_batch();
        if batch.is_empty() {
            return BulkReport::default();
        }

        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for op in &batch {
            match op {
                PendingOperation::Upsert(doc) => upserts.push(doc.clone()),
                PendingOperation::Delete(id) => deletes.push(id.clone()),
            }
        }

        debug!(
            upserts = upserts.len(),
            deletes = deletes.len(),
            "flushing batch"
        );

        let index = &self.index;
        let outcome = retry_with_backoff(&self.retry, "batch flush", || async {
            let mut report = BulkReport::default();
            if !upserts.is_empty() {
                report.merge(index.bulk_upsert(&upserts).await?);
            }
            for id in &deletes {
                index.delete_one(id).await?;
                report.processed += 1;
            }
            Ok(report)
        })
        .await;

        match outcome {
            Ok(report) => {
                self.stats.record_processed(report.processed);
                self.stats.record_errors(report.errors);
                self.stats.mark_sync();
                report
            }
            Err(e) => {
                let failed = batch.len() as u64;
                error!(error = %e, batch = failed, "batch flush exhausted retries, re-queueing");
                self.stats.record_errors(failed);
                self.requeue_front(batch, batch_bytes);
                BulkReport {
                    errors: failed,
                    ..BulkReport::default()
                }
            }
        }
    }

    /// Detaches up to `batch_size` operations (stopping early at the
    /// byte cap) from the front of the queue.
    fn detach_batch(&self) -> (Vec<PendingOperation>, usize) {
        let mut batch = Vec::new();
        let mut batch_bytes = 0usize;
        {
            let mut queue = self.queue.lock();
            while batch.len() < self.batch_size {
                let op_bytes = match queue.front() {
                    Some(op) => op.estimated_bytes(),
                    None => break,
                };
                if !batch.is_empty() && batch_bytes + op_bytes > self.max_batch_bytes {
                    break;
                }
                match queue.pop_front() {
                    Some(op) => {
                        batch_bytes += op_bytes;
                        batch.push(op);
                    }
                    None => break,
                }
            }
        }
        self.queued_bytes.fetch_sub(batch_bytes, Ordering::SeqCst);
        (batch, batch_bytes)
    }

    /// Re-inserts a failed batch at the front of the queue, preserving
    /// ordering relative to not-yet-processed items.
    fn requeue_front(&self, batch: Vec<PendingOperation>, batch_bytes: usize) {
        let mut queue = self.queue.lock();
        for op in batch.into_iter().rev() {
            queue.push_front(op);
        }
        self.queued_bytes.fetch_add(batch_bytes, Ordering::SeqCst);
    }
}

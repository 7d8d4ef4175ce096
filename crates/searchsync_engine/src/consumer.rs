//! Change feed consumer: the continuous replication path.

use crate::batch::BatchProcessor;
use parking_lot::Mutex;
use searchsync_core::{
    ChangeEvent, ChangeOperation, StatsSnapshot, SubsystemStats, SyncError, SyncResult,
    SyncSettings,
};
use searchsync_store::{ChangeFeed, SearchIndex, SourceStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Drives the source change feed into the batch processor.
///
/// The event loop awaits each event's enqueue before requesting the
/// next, so a slow downstream pauses the feed instead of buffering it
/// unboundedly. Feed interruptions are logged and the feed is reopened
/// after a fixed backoff; no resume position is kept, so an interruption
/// may introduce a delivery gap. That gap is healed by reconciliation,
/// not by the consumer.
pub struct ChangeFeedConsumer<S: SourceStore, T: SearchIndex> {
    source: Arc<S>,
    processor: Arc<BatchProcessor<T>>,
    feed_retry_delay: Duration,
    stats: Arc<SubsystemStats>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SourceStore, T: SearchIndex> ChangeFeedConsumer<S, T> {
    /// Creates a consumer feeding the given processor.
    pub fn new(source: Arc<S>, processor: Arc<BatchProcessor<T>>, settings: &SyncSettings) -> Self {
        Self {
            source,
            processor,
            feed_retry_delay: settings.feed_retry_delay,
            stats: Arc::new(SubsystemStats::new()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Opens the change feed and spawns the event loop.
    ///
    /// Fails without entering the running state when the source cannot
    /// be reached at all.
    pub async fn start(&self) -> SyncResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }

        let feed = match self.source.watch().await {
            Ok(feed) => feed,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            feed,
            Arc::clone(&self.source),
            Arc::clone(&self.processor),
            Arc::clone(&self.stats),
            self.feed_retry_delay,
            rx,
        ));

        *self.shutdown.lock() = Some(tx);
        *self.handle.lock() = Some(task);
        info!("change feed consumer started");
        Ok(())
    }

    /// Stops the event loop, closes the feed and drains the processor.
    ///
    /// Nothing accumulated is silently dropped: the final drain runs
    /// before this returns.
    pub async fn stop(&self) -> SyncResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SyncError::NotRunning);
        }

        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.processor.drain().await;
        self.running.store(false, Ordering::SeqCst);
        info!("change feed consumer stopped");
        Ok(())
    }

    /// Whether the event loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn run_loop<S: SourceStore, T: SearchIndex>(
    mut feed: Box<dyn ChangeFeed>,
    source: Arc<S>,
    processor: Arc<BatchProcessor<T>>,
    stats: Arc<SubsystemStats>,
    retry_delay: Duration,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            _ = stopped.changed() => break,
            item = feed.next() => item,
        };

        match item {
            Ok(Some(event)) => handle_event(&processor, &stats, event).await,
            Ok(None) => {
                warn!("change feed closed, reopening");
                match reopen(&source, retry_delay, &mut stopped).await {
                    Some(new_feed) => feed = new_feed,
                    None => break,
                }
            }
            Err(e) => {
                warn!(error = %e, "change feed interrupted, reopening");
                stats.record_errors(1);
                match reopen(&source, retry_delay, &mut stopped).await {
                    Some(new_feed) => feed = new_feed,
                    None => break,
                }
            }
        }
    }
    feed.close();
}

async fn handle_event<T: SearchIndex>(
    processor: &BatchProcessor<T>,
    stats: &SubsystemStats,
    event: ChangeEvent,
) {
    match event.operation {
        ChangeOperation::Delete => {
            processor.add_delete(event.id).await;
            stats.record_processed(1);
        }
        ChangeOperation::Insert | ChangeOperation::Update | ChangeOperation::Replace => {
            match event.document {
                Some(document) => {
                    processor.add(document).await;
                    stats.record_processed(1);
                }
                None => {
                    // The source document vanished before the feed could
                    // resolve it; the delete event follows on its own.
                    debug!(id = %event.id, "event without resolvable document, skipping");
                    stats.record_skipped(1);
                }
            }
        }
    }
}

/// Waits out the backoff, then reopens the feed. Returns `None` when a
/// shutdown arrives first. Reopening resumes from the present; missed
/// events are not replayed.
async fn reopen<S: SourceStore>(
    source: &Arc<S>,
    retry_delay: Duration,
    stopped: &mut watch::Receiver<bool>,
) -> Option<Box<dyn ChangeFeed>> {
    loop {
        tokio::select! {
            _ = stopped.changed() => return None,
            _ = tokio::time::sleep(retry_delay) => {}
        }
        match source.watch().await {
            Ok(feed) => {
                info!("change feed reopened");
                return Some(feed);
            }
            Err(e) => warn!(error = %e, "change feed reopen failed, will retry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchsync_core::Document;
    use searchsync_store::{MemoryIndex, MemorySource};
    use serde_json::json;

    fn doc(id: &str, value: serde_json::Value) -> Document {
        Document::from_value(id, value)
    }

    fn setup(batch_size: usize) -> (
        Arc<MemorySource>,
        Arc<MemoryIndex>,
        Arc<BatchProcessor<MemoryIndex>>,
        ChangeFeedConsumer<MemorySource, MemoryIndex>,
    ) {
        let settings = SyncSettings::default()
            .with_batch_size(batch_size)
            .without_delays();
        let source = Arc::new(MemorySource::new());
        let index = Arc::new(MemoryIndex::new());
        let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
        let consumer =
            ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);
        (source, index, processor, consumer)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn events_flow_into_index() {
        let (source, index, processor, consumer) = setup(100);
        consumer.start().await.unwrap();

        source.put(doc("a", json!({"v": 1})));
        source.put(doc("b", json!({"v": 2})));
        settle().await;
        processor.flush().await;

        assert_eq!(index.len(), 2);
        assert_eq!(consumer.stats().processed, 2);
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn threshold_flushes_without_explicit_flush() {
        let (source, index, _processor, consumer) = setup(2);
        consumer.start().await.unwrap();

        source.put(doc("a", json!({})));
        source.put(doc("b", json!({})));
        settle().await;

        assert_eq!(index.len(), 2);
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn delete_events_remove_documents() {
        let (source, index, _processor, consumer) = setup(1);
        consumer.start().await.unwrap();

        source.put(doc("a", json!({})));
        settle().await;
        assert_eq!(index.len(), 1);

        source.remove(&"a".into());
        settle().await;
        assert_eq!(index.len(), 0);
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_events_are_skipped_not_errors() {
        let (source, index, processor, consumer) = setup(100);
        consumer.start().await.unwrap();

        source.emit_event(ChangeEvent::unresolved(ChangeOperation::Update, "ghost"));
        settle().await;
        processor.flush().await;

        assert_eq!(index.len(), 0);
        let stats = consumer.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 0);
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_drains_accumulated_operations() {
        let (source, index, _processor, consumer) = setup(100);
        consumer.start().await.unwrap();

        source.put(doc("pending", json!({})));
        settle().await;
        assert_eq!(index.len(), 0);

        consumer.stop().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(!consumer.is_running());
    }

    #[tokio::test]
    async fn start_fails_when_source_unreachable() {
        let (source, _index, _processor, consumer) = setup(100);
        source.set_unreachable(true);

        assert!(consumer.start().await.is_err());
        assert!(!consumer.is_running());

        source.set_unreachable(false);
        consumer.start().await.unwrap();
        assert!(consumer.is_running());
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (_source, _index, _processor, consumer) = setup(100);
        consumer.start().await.unwrap();
        assert!(matches!(
            consumer.start().await,
            Err(SyncError::AlreadyRunning)
        ));
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let (_source, _index, _processor, consumer) = setup(100);
        assert!(matches!(consumer.stop().await, Err(SyncError::NotRunning)));
    }

    #[tokio::test]
    async fn feed_interruption_reopens_and_resumes() {
        let (source, index, processor, consumer) = setup(100);
        consumer.start().await.unwrap();

        source.emit_feed_error("connection reset");
        // Allow the backoff to elapse and the feed to reopen.
        tokio::time::sleep(Duration::from_millis(120)).await;

        source.put(doc("after-reopen", json!({})));
        settle().await;
        processor.flush().await;

        assert!(index.get(&"after-reopen".into()).is_some());
        assert_eq!(consumer.stats().errors, 1);
        consumer.stop().await.unwrap();
    }
}

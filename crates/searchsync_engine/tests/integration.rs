//! End-to-end scenarios over the in-memory stores.

use searchsync_core::{Document, SyncSettings};
use searchsync_engine::{
    BatchProcessor, ChangeFeedConsumer, DriftDetector, FullSyncDriver, ReconciliationEngine,
};
use searchsync_store::{MemoryIndex, MemorySource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn doc(id: &str, value: serde_json::Value) -> Document {
    Document::from_value(id, value)
}

fn settings(batch_size: usize) -> SyncSettings {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    SyncSettings::default()
        .with_batch_size(batch_size)
        .without_delays()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn continuous_path_replicates_live_changes() {
    let settings = settings(2);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
    let consumer = ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);

    consumer.start().await.unwrap();

    source.put(doc("user-1", json!({"name": "Ada"})));
    source.put(doc("user-2", json!({"name": "Grace"})));
    source.put(doc("user-1", json!({"name": "Ada L."})));
    source.remove(&"user-2".into());
    settle().await;

    consumer.stop().await.unwrap();

    assert_eq!(
        index.get(&"user-1".into()).unwrap().fields.get("name"),
        Some(&json!("Ada L."))
    );
    assert!(index.get(&"user-2".into()).is_none());
}

#[tokio::test]
async fn per_id_ordering_survives_batching() {
    let settings = settings(100);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
    let consumer = ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);

    consumer.start().await.unwrap();
    for v in 1..=20 {
        source.put(doc("hot", json!({"v": v})));
    }
    settle().await;
    consumer.stop().await.unwrap();

    assert_eq!(
        index.get(&"hot".into()).unwrap().fields.get("v"),
        Some(&json!(20))
    );
}

#[tokio::test]
async fn delivery_gap_is_healed_by_reconciliation() {
    let settings = settings(100);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());

    // 1000 documents exist in the source; 950 made it to the index
    // before a simulated delivery loss.
    for i in 0..1000 {
        let d = doc(&format!("doc-{i:04}"), json!({"n": i}));
        source.put_silent(d.clone());
        if i < 950 {
            index.seed(d);
        }
    }

    let reconciler =
        ReconciliationEngine::new(Arc::clone(&source), Arc::clone(&index), &settings);

    let report = reconciler.check_and_sync().await.unwrap();
    assert_eq!(report.missing, 50);
    assert_eq!(report.synced, 50);

    let followup = reconciler.check_and_sync().await.unwrap();
    assert!(followup.in_sync);
    assert_eq!(followup.difference, 0);
}

#[tokio::test]
async fn drift_detector_escalates_to_full_sync() {
    let settings = settings(100).with_auto_sync_threshold(10);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    for i in 0..100 {
        source.put_silent(doc(&format!("doc-{i:03}"), json!({"n": i})));
    }

    let full_sync = Arc::new(FullSyncDriver::new(
        Arc::clone(&source),
        Arc::clone(&index),
        &settings,
    ));
    let detector = DriftDetector::new(
        Arc::clone(&source),
        Arc::clone(&index),
        full_sync,
        &settings,
    );

    let report = detector.check_counts().await.unwrap();
    assert!(!report.is_match);
    assert_eq!(report.difference, 100);

    for _ in 0..100 {
        if index.len() == 100 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(index.len(), 100);
    assert!(detector.check_counts().await.unwrap().is_match);
}

#[tokio::test]
async fn backend_outage_is_absorbed_and_recovered() {
    let settings = settings(100);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
    let consumer = ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);

    consumer.start().await.unwrap();
    source.put(doc("a", json!({})));
    source.put(doc("b", json!({})));
    settle().await;

    // The index stays down through every retry attempt; the batch is
    // re-queued rather than lost, and no error escapes the flush.
    index.fail_next(3);
    let failed = processor.flush().await;
    assert_eq!(failed.errors, 2);
    assert_eq!(processor.pending_len(), 2);

    // Recovery: the same operations apply on the next flush.
    let recovered = processor.flush().await;
    assert_eq!(recovered.processed, 2);
    assert_eq!(index.len(), 2);

    consumer.stop().await.unwrap();
}

#[tokio::test]
async fn feed_interruption_gap_heals_end_to_end() {
    let settings = settings(1);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
    let consumer = ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);
    let reconciler =
        ReconciliationEngine::new(Arc::clone(&source), Arc::clone(&index), &settings);

    consumer.start().await.unwrap();
    source.put(doc("before", json!({})));
    settle().await;

    // Interrupt the feed, then mutate the source while no feed is open:
    // these changes are the delivery gap.
    source.emit_feed_error("cursor invalidated");
    source.close_feeds();
    source.put_silent(doc("lost-1", json!({})));
    source.put_silent(doc("lost-2", json!({})));

    // Wait for the reopen, then confirm live events flow again.
    tokio::time::sleep(Duration::from_millis(150)).await;
    source.put(doc("after", json!({})));
    settle().await;
    consumer.stop().await.unwrap();

    assert!(index.get(&"before".into()).is_some());
    assert!(index.get(&"after".into()).is_some());
    assert!(index.get(&"lost-1".into()).is_none());

    // Reconciliation heals the gap the consumer could not see.
    let report = reconciler.check_and_sync().await.unwrap();
    assert_eq!(report.missing, 2);
    assert!(reconciler.check_and_sync().await.unwrap().in_sync);
}

#[tokio::test]
async fn full_sync_bootstrap_then_incremental() {
    let settings = settings(2);
    let source = Arc::new(MemorySource::new());
    let index = Arc::new(MemoryIndex::new());
    for i in 0..30 {
        source.put_silent(doc(&format!("seed-{i:02}"), json!({"n": i})));
    }

    let driver = FullSyncDriver::new(Arc::clone(&source), Arc::clone(&index), &settings);
    let report = driver.run_with(10).await.unwrap();
    assert_eq!(report.processed, 30);
    assert_eq!(index.len(), 30);

    let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), &settings));
    let consumer = ChangeFeedConsumer::new(Arc::clone(&source), Arc::clone(&processor), &settings);
    consumer.start().await.unwrap();
    source.put(doc("live", json!({})));
    settle().await;
    consumer.stop().await.unwrap();

    assert_eq!(index.len(), 31);
}

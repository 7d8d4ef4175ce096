//! The sync monitor: lifecycle and manual triggers for every subsystem.

use crate::config::MonitorConfig;
use crate::error::{ServerError, ServerResult};
use parking_lot::Mutex;
use searchsync_core::StatsSnapshot;
use searchsync_engine::{
    BatchProcessor, ChangeFeedConsumer, DriftDetector, DriftReport, FullSyncDriver, PeriodicTask,
    ProcessorState, ReconciliationEngine, ReconciliationReport,
};
use searchsync_store::{BulkReport, SearchIndex, SourceStore};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Point-in-time view of the monitor and all subsystems.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    /// Whether the continuous path is active.
    pub running: bool,
    /// Operations waiting in the batch processor.
    pub pending_operations: usize,
    /// Change feed consumer counters.
    pub consumer: StatsSnapshot,
    /// Batch processor counters.
    pub processor: StatsSnapshot,
    /// Full sync driver counters.
    pub full_sync: StatsSnapshot,
    /// Drift detector counters.
    pub drift: StatsSnapshot,
    /// Reconciliation engine counters.
    pub reconcile: StatsSnapshot,
}

/// Owns every subsystem between one source store and one search index.
///
/// The monitor wires the continuous path (consumer into processor) and
/// the safety nets (drift detector, reconciliation engine, full sync
/// driver) over shared store handles, schedules the timer-driven ones,
/// and exposes each as a manual trigger. Triggers work whether or not
/// the continuous path is running; only [`SyncMonitor::start`] and
/// [`SyncMonitor::stop`] are lifecycle-gated.
pub struct SyncMonitor<S: SourceStore, T: SearchIndex> {
    config: MonitorConfig,
    processor: Arc<BatchProcessor<T>>,
    consumer: Arc<ChangeFeedConsumer<S, T>>,
    full_sync: Arc<FullSyncDriver<S, T>>,
    drift: Arc<DriftDetector<S, T>>,
    reconcile: Arc<ReconciliationEngine<S, T>>,
    running: AtomicBool,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl<S: SourceStore, T: SearchIndex> SyncMonitor<S, T> {
    /// Wires the subsystems over the given stores.
    pub fn new(source: Arc<S>, index: Arc<T>, config: MonitorConfig) -> Self {
        let settings = &config.settings;
        let processor = Arc::new(BatchProcessor::new(Arc::clone(&index), settings));
        let consumer = Arc::new(ChangeFeedConsumer::new(
            Arc::clone(&source),
            Arc::clone(&processor),
            settings,
        ));
        let full_sync = Arc::new(FullSyncDriver::new(
            Arc::clone(&source),
            Arc::clone(&index),
            settings,
        ));
        let drift = Arc::new(DriftDetector::new(
            Arc::clone(&source),
            Arc::clone(&index),
            Arc::clone(&full_sync),
            settings,
        ));
        let reconcile = Arc::new(ReconciliationEngine::new(source, index, settings));

        Self {
            config,
            processor,
            consumer,
            full_sync,
            drift,
            reconcile,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts the continuous path and the enabled timers.
    ///
    /// On a feed open failure nothing is left running; a later retry of
    /// `start` begins from a clean state.
    pub async fn start(&self) -> ServerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        if let Err(e) = self.consumer.start().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let mut tasks = Vec::new();
        let settings = &self.config.settings;

        if self.config.enable_periodic_flush {
            tasks.push(self.processor.spawn_periodic_flush(settings.flush_interval));
        }
        if self.config.enable_drift_detector {
            let drift = Arc::clone(&self.drift);
            tasks.push(PeriodicTask::spawn(
                "drift-check",
                settings.drift_startup_delay,
                settings.drift_interval,
                move || {
                    let drift = Arc::clone(&drift);
                    async move { drift.check_counts().await.map(|_| ()) }
                },
            ));
        }
        if self.config.enable_reconciliation {
            let reconcile = Arc::clone(&self.reconcile);
            tasks.push(PeriodicTask::spawn(
                "reconcile",
                settings.reconcile_startup_delay,
                settings.reconcile_interval,
                move || {
                    let reconcile = Arc::clone(&reconcile);
                    async move { reconcile.check_and_sync().await.map(|_| ()) }
                },
            ));
        }

        let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
        *self.tasks.lock() = tasks;
        info!(timers = ?names, "sync monitor started");
        Ok(())
    }

    /// Stops the timers and the continuous path.
    ///
    /// Timer loops finish their in-flight tick before stopping, and the
    /// consumer drains the processor, so nothing accumulated is lost.
    pub async fn stop(&self) -> ServerResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ServerError::NotRunning);
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.stop().await;
        }
        self.consumer.stop().await?;

        self.running.store(false, Ordering::SeqCst);
        info!("sync monitor stopped");
        Ok(())
    }

    /// Whether the continuous path is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Collects a point-in-time status of every subsystem.
    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running(),
            pending_operations: self.processor.pending_len(),
            consumer: self.consumer.stats(),
            processor: self.processor.stats(),
            full_sync: self.full_sync.stats(),
            drift: self.drift.stats(),
            reconcile: self.reconcile.stats(),
        }
    }

    /// Current batch processor state.
    pub fn processor_state(&self) -> ProcessorState {
        self.processor.state()
    }

    /// Flushes the batch processor once.
    pub async fn trigger_flush(&self) -> BulkReport {
        self.processor.flush().await
    }

    /// Runs one reconciliation cycle now.
    pub async fn trigger_reconcile(&self) -> ServerResult<ReconciliationReport> {
        Ok(self.reconcile.check_and_sync().await?)
    }

    /// Runs a full sync now, returning when it completes.
    pub async fn trigger_full_sync(&self) -> ServerResult<BulkReport> {
        Ok(self.full_sync.run().await?)
    }

    /// Runs one drift count check now.
    pub async fn trigger_drift_check(&self) -> ServerResult<DriftReport> {
        Ok(self.drift.check_counts().await?)
    }
}

//! Scheduled background tasks.
//!
//! Timer-driven subsystems run as [`PeriodicTask`]s with an explicit stop
//! signal instead of bare repeating timers. The tick bodies are public
//! subsystem methods, so tests drive single ticks deterministically
//! rather than waiting on wall-clock timers.

use searchsync_core::SyncResult;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A named background loop: startup delay, then one tick per interval.
///
/// Tick errors are logged and never terminate the loop; only an explicit
/// [`PeriodicTask::stop`] (or dropping the task, which aborts it) ends it.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawns the loop on the current tokio runtime.
    pub fn spawn<F, Fut>(
        name: &'static str,
        startup_delay: Duration,
        interval: Duration,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<()>> + Send,
    {
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(startup_delay) => {}
                _ = stopped.changed() => return,
            }

            loop {
                debug!(task = name, "tick");
                if let Err(e) = tick().await {
                    warn!(task = name, error = %e, "tick failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stopped.changed() => break,
                }
            }
        });

        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Task name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the loop to stop and waits for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchsync_core::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_repeat_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let task = PeriodicTask::spawn(
            "test",
            Duration::ZERO,
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected repeated ticks, got {after_stop}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn startup_delay_defers_first_tick() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let task = PeriodicTask::spawn(
            "test",
            Duration::from_secs(60),
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        task.stop().await;
    }

    #[tokio::test]
    async fn failing_tick_does_not_stop_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let task = PeriodicTask::spawn(
            "test",
            Duration::ZERO,
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::backend_retryable("down")) }
            },
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop().await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}

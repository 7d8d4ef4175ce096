//! Configuration surface for the replication engine.
//!
//! Every knob is a plain numeric or string value with a documented default
//! and an environment variable override. Malformed values fall back to the
//! default with a warning rather than failing startup.

use crate::retry::RetryPolicy;
use std::time::Duration;
use tracing::warn;

/// All tunable settings for the replication engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Maximum operations per bulk request (`SYNC_BATCH_SIZE`).
    pub batch_size: usize,
    /// Serialized byte cap per batch (`SYNC_BATCH_MAX_BYTES`).
    pub max_batch_bytes: usize,
    /// Periodic flush interval (`SYNC_FLUSH_INTERVAL_MS`).
    pub flush_interval: Duration,
    /// Retry policy for bulk writes (`SYNC_RETRY_ATTEMPTS`,
    /// `SYNC_RETRY_BASE_DELAY_MS`).
    pub retry: RetryPolicy,
    /// Delay before reopening an interrupted change feed
    /// (`SYNC_FEED_RETRY_DELAY_MS`).
    pub feed_retry_delay: Duration,
    /// Interval between reconciliation passes
    /// (`SYNC_RECONCILE_INTERVAL_SECS`).
    pub reconcile_interval: Duration,
    /// Startup delay before the first reconciliation pass
    /// (`SYNC_RECONCILE_STARTUP_DELAY_SECS`).
    pub reconcile_startup_delay: Duration,
    /// Interval between drift count checks (`SYNC_DRIFT_INTERVAL_SECS`).
    pub drift_interval: Duration,
    /// Startup delay before the first drift check
    /// (`SYNC_DRIFT_STARTUP_DELAY_SECS`).
    pub drift_startup_delay: Duration,
    /// Absolute count difference that triggers an automatic full sync
    /// (`SYNC_AUTO_SYNC_THRESHOLD`).
    pub auto_sync_threshold: u64,
    /// Delay before the follow-up count check after a triggered full sync
    /// (`SYNC_POST_SYNC_CHECK_DELAY_SECS`).
    pub post_sync_check_delay: Duration,
    /// Documents fetched per repair batch (`SYNC_REPAIR_BATCH_SIZE`).
    pub repair_batch_size: usize,
    /// Pause between repair batches (`SYNC_INTER_BATCH_DELAY_MS`).
    pub inter_batch_delay: Duration,
    /// Documents per full-sync page (`SYNC_FULL_SYNC_PAGE_SIZE`).
    pub full_sync_page_size: usize,
    /// Pause between full-sync pages (`SYNC_FULL_SYNC_PAGE_DELAY_MS`).
    pub full_sync_page_delay: Duration,
    /// Source documents sampled when diagnosing drift
    /// (`SYNC_DIAG_SAMPLE_SIZE`).
    pub diag_sample_size: usize,
    /// Logical grouping field used as the routing key
    /// (`SYNC_ROUTING_FIELD`).
    pub routing_field: String,
}

impl SyncSettings {
    /// Loads settings from the environment, falling back to defaults for
    /// missing or malformed values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_usize("SYNC_BATCH_SIZE", defaults.batch_size),
            max_batch_bytes: env_usize("SYNC_BATCH_MAX_BYTES", defaults.max_batch_bytes),
            flush_interval: env_millis("SYNC_FLUSH_INTERVAL_MS", defaults.flush_interval),
            retry: RetryPolicy::new(env_u32("SYNC_RETRY_ATTEMPTS", 3)).with_base_delay(
                env_millis("SYNC_RETRY_BASE_DELAY_MS", Duration::from_millis(1000)),
            ),
            feed_retry_delay: env_millis("SYNC_FEED_RETRY_DELAY_MS", defaults.feed_retry_delay),
            reconcile_interval: env_secs(
                "SYNC_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval,
            ),
            reconcile_startup_delay: env_secs(
                "SYNC_RECONCILE_STARTUP_DELAY_SECS",
                defaults.reconcile_startup_delay,
            ),
            drift_interval: env_secs("SYNC_DRIFT_INTERVAL_SECS", defaults.drift_interval),
            drift_startup_delay: env_secs(
                "SYNC_DRIFT_STARTUP_DELAY_SECS",
                defaults.drift_startup_delay,
            ),
            auto_sync_threshold: env_u64("SYNC_AUTO_SYNC_THRESHOLD", defaults.auto_sync_threshold),
            post_sync_check_delay: env_secs(
                "SYNC_POST_SYNC_CHECK_DELAY_SECS",
                defaults.post_sync_check_delay,
            ),
            repair_batch_size: env_usize("SYNC_REPAIR_BATCH_SIZE", defaults.repair_batch_size),
            inter_batch_delay: env_millis("SYNC_INTER_BATCH_DELAY_MS", defaults.inter_batch_delay),
            full_sync_page_size: env_usize(
                "SYNC_FULL_SYNC_PAGE_SIZE",
                defaults.full_sync_page_size,
            ),
            full_sync_page_delay: env_millis(
                "SYNC_FULL_SYNC_PAGE_DELAY_MS",
                defaults.full_sync_page_delay,
            ),
            diag_sample_size: env_usize("SYNC_DIAG_SAMPLE_SIZE", defaults.diag_sample_size),
            routing_field: std::env::var("SYNC_ROUTING_FIELD")
                .unwrap_or(defaults.routing_field),
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the batch byte cap.
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Sets the periodic flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the auto-sync threshold.
    pub fn with_auto_sync_threshold(mut self, threshold: u64) -> Self {
        self.auto_sync_threshold = threshold;
        self
    }

    /// Sets the repair batch size.
    pub fn with_repair_batch_size(mut self, size: usize) -> Self {
        self.repair_batch_size = size;
        self
    }

    /// Removes the pacing delays, for tests.
    pub fn without_delays(mut self) -> Self {
        self.inter_batch_delay = Duration::ZERO;
        self.full_sync_page_delay = Duration::ZERO;
        self.feed_retry_delay = Duration::from_millis(10);
        self.post_sync_check_delay = Duration::from_millis(10);
        self.reconcile_startup_delay = Duration::ZERO;
        self.drift_startup_delay = Duration::ZERO;
        self.retry = self
            .retry
            .with_base_delay(Duration::from_millis(1))
            .without_jitter();
        self
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_batch_bytes: 5 * 1024 * 1024,
            flush_interval: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            feed_retry_delay: Duration::from_millis(5000),
            reconcile_interval: Duration::from_secs(1800),
            reconcile_startup_delay: Duration::from_secs(60),
            drift_interval: Duration::from_secs(21600),
            drift_startup_delay: Duration::from_secs(120),
            auto_sync_threshold: 100,
            post_sync_check_delay: Duration::from_secs(300),
            repair_batch_size: 100,
            inter_batch_delay: Duration::from_millis(100),
            full_sync_page_size: 500,
            full_sync_page_delay: Duration::from_millis(200),
            diag_sample_size: 5,
            routing_field: "account_id".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed environment value");
            None
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env_parse(key).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_parse(key).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_parse(key).unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_millis).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_secs).unwrap_or(default)
}

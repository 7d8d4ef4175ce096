//! Monitor configuration.

use searchsync_core::SyncSettings;

/// Configuration for the sync monitor.
///
/// Wraps the engine settings with toggles for the timer-driven
/// subsystems. Disabling a timer removes only its schedule; the
/// corresponding manual trigger keeps working.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Engine tuning knobs.
    pub settings: SyncSettings,
    /// Whether to run the periodic batch flush timer.
    pub enable_periodic_flush: bool,
    /// Whether to schedule drift count checks.
    pub enable_drift_detector: bool,
    /// Whether to schedule reconciliation passes.
    pub enable_reconciliation: bool,
}

impl MonitorConfig {
    /// Creates a configuration with all timers enabled.
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            enable_periodic_flush: true,
            enable_drift_detector: true,
            enable_reconciliation: true,
        }
    }

    /// Loads engine settings from the environment, all timers enabled.
    pub fn from_env() -> Self {
        Self::new(SyncSettings::from_env())
    }

    /// Sets whether the periodic flush timer runs.
    pub fn with_periodic_flush(mut self, enabled: bool) -> Self {
        self.enable_periodic_flush = enabled;
        self
    }

    /// Sets whether drift checks are scheduled.
    pub fn with_drift_detector(mut self, enabled: bool) -> Self {
        self.enable_drift_detector = enabled;
        self
    }

    /// Sets whether reconciliation passes are scheduled.
    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.enable_reconciliation = enabled;
        self
    }

    /// Disables every timer, leaving only manual triggers. Used by tests
    /// and by deployments that schedule externally.
    pub fn manual_only(mut self) -> Self {
        self.enable_periodic_flush = false;
        self.enable_drift_detector = false;
        self.enable_reconciliation = false;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_all_timers() {
        let config = MonitorConfig::default();
        assert!(config.enable_periodic_flush);
        assert!(config.enable_drift_detector);
        assert!(config.enable_reconciliation);
    }

    #[test]
    fn manual_only_disables_timers() {
        let config = MonitorConfig::default().manual_only();
        assert!(!config.enable_periodic_flush);
        assert!(!config.enable_drift_detector);
        assert!(!config.enable_reconciliation);
    }

    #[test]
    fn toggles_are_independent() {
        let config = MonitorConfig::default()
            .with_drift_detector(false)
            .with_reconciliation(true);
        assert!(config.enable_periodic_flush);
        assert!(!config.enable_drift_detector);
        assert!(config.enable_reconciliation);
    }
}

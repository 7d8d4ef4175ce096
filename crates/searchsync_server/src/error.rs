//! Error types for the control plane.

use searchsync_core::SyncError;
use thiserror::Error;

/// Result type for control plane operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the control plane.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The monitor is already running.
    #[error("monitor is already running")]
    AlreadyRunning,

    /// The monitor is not running.
    #[error("monitor is not running")]
    NotRunning,

    /// An engine subsystem failed.
    #[error(transparent)]
    Engine(#[from] SyncError),
}

impl ServerError {
    /// Returns true when the caller holds a stale view of the lifecycle
    /// state rather than having hit a backend failure.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, ServerError::AlreadyRunning | ServerError::NotRunning)
    }
}

//! Error types for the replication engine.

use crate::document::DocumentId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while replicating between the two stores.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Backend store error (either side).
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The change feed was interrupted or closed.
    #[error("change feed error: {0}")]
    Feed(String),

    /// A single document could not be applied (malformed payload,
    /// missing required field). Never fatal to a batch.
    #[error("document {id} rejected: {message}")]
    Document {
        /// Identifier of the rejected document.
        id: DocumentId,
        /// Rejection reason.
        message: String,
    },

    /// A document looked up by id does not exist in the source.
    #[error("document {0} not found in source")]
    NotFound(DocumentId),

    /// A subsystem was asked to start while already running.
    #[error("subsystem already running")]
    AlreadyRunning,

    /// A subsystem was asked to act while not running.
    #[error("subsystem not running")]
    NotRunning,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a per-document rejection.
    pub fn document(id: DocumentId, message: impl Into<String>) -> Self {
        Self::Document {
            id,
            message: message.into(),
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    ///
    /// Per-document rejections are permanent and never retried; feed
    /// errors are handled by reopening the feed, not by retrying the
    /// failed receive.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Backend { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

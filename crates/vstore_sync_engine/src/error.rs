//! Error types for the sync engine.

use thiserror::Error;
use vstore_core::StoreError;
use vstore_sync_protocol::ProtocolError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Framing or message codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Not connected.
    #[error("not connected to authority")]
    NotConnected,

    /// Socket I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected | SyncError::Io(_) => true,
            _ => false,
        }
    }
}

//! Error types for atomickv
//!
//! Provides a unified error type for all store, batch and backend operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for atomickv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Batch Errors
    // -------------------------------------------------------------------------
    /// An operation was attempted on a batch that has already been closed.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend answered an immediate command with an error reply.
    #[error("Backend error: {0}")]
    Backend(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Whether a fresh attempt (with a new batch) could succeed.
    ///
    /// Nothing in this crate retries on its own; this only classifies.
    ///
    /// A `CommitFailed` caused by one command failing inside EXEC leaves the
    /// other queued commands applied on the server. Re-read the affected
    /// keys before running the same writes again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Transport(_) | KvError::CommitFailed(_))
    }

    pub(crate) fn closed_batch(op: &str) -> Self {
        KvError::Usage(format!("{} called on a closed batch", op))
    }
}

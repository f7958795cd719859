//! Unified error types for the STM facade.
//!
//! This module provides a clean error type that wraps the engine's internal
//! errors and presents a consistent interface to users.

use stm_core::{ConflictKind, StmError, TxnId};
use thiserror::Error;

/// All facade errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Commit conflict; retrying the transaction body may succeed
    #[error("{txn_id} conflict: {kind}")]
    Conflict {
        /// Transaction that lost
        txn_id: TxnId,
        /// What went stale
        kind: ConflictKind,
    },

    /// Operation not permitted (programmer error)
    #[error("illegal operation: {0}")]
    IllegalOperation(String),

    /// Transaction already committed or aborted
    #[error("transaction not active: {0}")]
    NotActive(String),

    /// Transaction body aborted on purpose
    #[error("aborted: {0}")]
    Aborted(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error (spawning worker threads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed on retry with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

// Convert from engine errors
impl From<StmError> for Error {
    fn from(e: StmError) -> Self {
        match e {
            StmError::Conflict { txn_id, kind } => Error::Conflict { txn_id, kind },
            StmError::IllegalOperation { reason } => Error::IllegalOperation(reason),
            StmError::NotActive { txn_id, state } => {
                Error::NotActive(format!("{} is {}", txn_id, state))
            }
            StmError::Aborted { txn_id, reason } => {
                Error::Aborted(format!("{}: {}", txn_id, reason))
            }
            StmError::Config(msg) => Error::Config(msg),
            StmError::Internal(msg) => Error::Internal(msg),
        }
    }
}

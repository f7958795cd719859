//! Error types for the STM engine
//!
//! Errors fall into three groups:
//!
//! | Group | Variants | Caller reaction |
//! |-------|----------|-----------------|
//! | Conflict | [`StmError::Conflict`] | abort and retry the transaction body |
//! | Programmer error | [`StmError::IllegalOperation`], [`StmError::NotActive`], [`StmError::Config`] | fix the calling code |
//! | Invariant failure | [`StmError::Internal`] | bug in the engine |
//!
//! [`StmError::Aborted`] is what a transaction body returns when it chooses to
//! give up; it is neither retried nor treated as a bug.

use crate::types::{CellId, TxnId, Version};
use thiserror::Error;

/// Result type used throughout the engine
pub type StmResult<T> = std::result::Result<T, StmError>;

/// Why a transaction lost a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// A read-set entry is stale: another transaction committed a newer
    /// version of the cell after this transaction's snapshot.
    StaleRead {
        /// Cell that was read
        cell: CellId,
        /// Version observed by the transaction
        read_version: Version,
        /// Newest committed version at validation time
        committed_version: Version,
    },
    /// A commit observer refused the commit.
    Vetoed {
        /// Observer-supplied reason
        reason: String,
    },
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::StaleRead {
                cell,
                read_version,
                committed_version,
            } => write!(
                f,
                "stale read of {}: read v{}, committed v{}",
                cell, read_version, committed_version
            ),
            ConflictKind::Vetoed { reason } => write!(f, "commit vetoed: {}", reason),
        }
    }
}

/// All engine errors.
#[derive(Debug, Error)]
pub enum StmError {
    /// Validation failed; the transaction's writes were discarded
    #[error("{txn_id} conflict: {kind}")]
    Conflict {
        /// Transaction that lost
        txn_id: TxnId,
        /// What went stale
        kind: ConflictKind,
    },

    /// Operation not permitted in the current context
    #[error("illegal operation: {reason}")]
    IllegalOperation {
        /// What was attempted
        reason: String,
    },

    /// Transaction is no longer active
    #[error("{txn_id} is not active ({state})")]
    NotActive {
        /// Transaction id
        txn_id: TxnId,
        /// Terminal state it is in
        state: String,
    },

    /// The transaction body asked to abort
    #[error("{txn_id} aborted: {reason}")]
    Aborted {
        /// Transaction id
        txn_id: TxnId,
        /// Caller-supplied reason
        reason: String,
    },

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal invariant violation (bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl StmError {
    /// Build an [`StmError::IllegalOperation`]
    pub fn illegal(reason: impl Into<String>) -> Self {
        StmError::IllegalOperation {
            reason: reason.into(),
        }
    }

    /// Build an [`StmError::Internal`]
    pub fn internal(message: impl Into<String>) -> Self {
        StmError::Internal(message.into())
    }

    /// Check if this error is retryable.
    ///
    /// Only conflicts are retryable; a fresh attempt sees newer data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StmError::Conflict { .. })
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StmError::Conflict { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, StmError::Internal(_))
    }

    /// The conflict kind, if this is a conflict
    pub fn conflict_kind(&self) -> Option<&ConflictKind> {
        match self {
            StmError::Conflict { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

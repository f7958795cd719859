//! Transaction modes and lifecycle states
//!
//! Mode transitions:
//! - `Speculative` → `ReadWrite` (first write, see [`TxnMode::upgrade`])
//! - `ReadOnly` and `ReadWrite` never change
//!
//! Status transitions:
//! - `Active` → `Committed`
//! - `Active` → `Aborted`
//!
//! Terminal states (no transitions allowed):
//! - `Committed`
//! - `Aborted`

use std::fmt;

/// How a transaction treats reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    /// Strict read-only: no read-set, writes are illegal
    ReadOnly,
    /// Assumed read-only: no write-set until the first write upgrades it.
    /// Reads are still recorded so an upgraded transaction validates them.
    Speculative,
    /// Tracks a read-set and a write-set; validated at commit
    ReadWrite,
}

impl TxnMode {
    /// Mode selected by `begin(read_only)`
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            TxnMode::Speculative
        } else {
            TxnMode::ReadWrite
        }
    }

    /// Transition taken when a write is attempted.
    ///
    /// Returns `None` if the mode does not permit writes at all.
    pub fn upgrade(self) -> Option<TxnMode> {
        match self {
            TxnMode::ReadOnly => None,
            TxnMode::Speculative | TxnMode::ReadWrite => Some(TxnMode::ReadWrite),
        }
    }

    /// Whether reads must be recorded for validation
    pub fn tracks_reads(&self) -> bool {
        matches!(self, TxnMode::Speculative | TxnMode::ReadWrite)
    }

    /// Whether the transaction can still avoid the commit section
    pub fn is_read_only(&self) -> bool {
        !matches!(self, TxnMode::ReadWrite)
    }
}

impl fmt::Display for TxnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxnMode::ReadOnly => "read-only",
            TxnMode::Speculative => "speculative",
            TxnMode::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl TransactionStatus {
    /// Whether no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Active)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => f.write_str("active"),
            TransactionStatus::Committed => f.write_str("committed"),
            TransactionStatus::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Kind of child context being constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestedKind {
    /// Sequential nested transaction
    Nested,
    /// Parallel sibling validated against its siblings
    Validated,
    /// Parallel sibling asserted to be disjoint
    Disjoint,
    /// Parallel sibling sharing an unisolated scratch space
    Unsafe,
}

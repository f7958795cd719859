//! Identity and version types
//!
//! - [`Version`]: position in the global commit order
//! - [`CellId`]: process-unique identity of a versioned cell
//! - [`TxnId`]: process-unique identity of a transaction attempt

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global commit version.
///
/// Version 0 is the genesis version: every cell's initial value is recorded
/// at version 0 and the commit sequence starts there. Each successful
/// read-write commit allocates the next version.
pub type Version = u64;

/// The version every engine starts at.
pub const GENESIS_VERSION: Version = 0;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a versioned cell
///
/// Cell ids key the read and write sets of transactions. They are allocated
/// from a process-wide counter so cells from different engines never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(u64);

impl CellId {
    /// Allocate a fresh, never-before-seen cell id
    pub fn next() -> Self {
        CellId(NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Unique identifier for a transaction attempt
///
/// Top-level transactions draw ids from their engine's counter. Nested and
/// parallel children reuse the id of their top-level ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

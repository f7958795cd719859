//! Convenient imports for the STM facade.
//!
//! ```
//! use strata_stm::prelude::*;
//!
//! let stm = Stm::new();
//! let hits = stm.new_accumulator(0u64, |a, b| a + b);
//! stm.atomically(|txn| hits.put(txn, 1))?;
//! # Ok::<(), strata_stm::Error>(())
//! ```

// Main entry point
pub use crate::stm::{Stm, StmBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Cells and transactions
pub use crate::types::{
    AccumulatorCell, ParallelTask, StmResult, SuspendToken, Transaction, TxnCellExt, TxnMode,
    VersionedCell,
};

//! # Strata STM
//!
//! In-process software transactional memory.
//!
//! Concurrent operations read and write shared [`VersionedCell`]s as if each
//! ran atomically and in isolation, without locks in the caller's code.
//!
//! ## Quick Start
//!
//! ```
//! use strata_stm::prelude::*;
//!
//! let stm = Stm::new();
//! let from = stm.new_cell(100i64);
//! let to = stm.new_cell(0i64);
//!
//! stm.atomically(|txn| {
//!     let amount = 25;
//!     let balance = txn.read(&from)?;
//!     txn.write(&from, balance - amount)?;
//!     let other = txn.read(&to)?;
//!     txn.write(&to, other + amount)
//! })?;
//!
//! assert_eq!((from.load(), to.load()), (75, 25));
//! # Ok::<(), strata_stm::Error>(())
//! ```
//!
//! ## Layers
//!
//! 1. **Cells** - [`VersionedCell`] keeps a chain of committed versions
//! 2. **Transactions** - [`Transaction`] reads a snapshot and buffers writes;
//!    commit validates the reads under one short critical section
//! 3. **Composition** - nested transactions, parallel fan-out
//!    ([`ParallelTask`]) and conflict-free [`AccumulatorCell`]s
//! 4. **Reclamation** - [`Stm::reclaim`] and [`Stm::spawn_reclaimer`] drop
//!    versions no live transaction can read
//!
//! ## Errors
//!
//! Conflicts are retryable ([`Error::is_retryable`]); [`Stm::atomically`]
//! retries them for you. Everything else is a programmer error or a bug.

#![warn(missing_docs)]

mod error;
mod reclaimer;
mod stm;
mod types;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use reclaimer::ReclaimWorker;
pub use stm::{Stm, StmBuilder};

// Re-export types
pub use types::*;

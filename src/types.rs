//! Public types for the STM facade.
//!
//! This module re-exports types from internal crates with a clean public interface.

// Identities and versions
pub use stm_core::{CellId, TxnId, Version, GENESIS_VERSION};

// Transaction state machine
pub use stm_core::{NestedKind, TransactionStatus, TxnMode};

// Configuration and engine errors
pub use stm_core::{CellValue, ConflictKind, StmConfig, StmError, StmResult};

// Cells
pub use stm_primitives::AccumulatorCell;
pub use stm_storage::{ReclaimStats, VersionedCell};

// Transactions
pub use stm_concurrency::{
    ambient, CommitInfo, MetricsSnapshot, ParallelTask, SuspendToken, TaskMode, Transaction,
    TransactionManager, TxnCellExt,
};

// Consistency hook points
pub use stm_concurrency::{CommitObserver, NestedTxnFactory, ObjectRegistry, StmHooks};

//! Concurrency layer for the strata STM engine
//!
//! This crate implements multi-version optimistic concurrency control:
//! - [`Transaction`]: read/write-set tracking against a fixed snapshot
//! - [`TransactionManager`]: begin, validated commit, suspend/resume, retry loop
//! - Nested transactions and parallel fan-out ([`ParallelTask`])
//! - [`ambient`]: optional thread-bound "current transaction"
//! - [`hooks`]: extension points for consistency-checking layers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ambient;
pub mod cell_ext;
pub mod hooks;
pub mod manager;
pub mod metrics;
pub mod parallel;
pub mod transaction;
pub mod view;
pub mod write_set;

pub use cell_ext::TxnCellExt;
pub use hooks::{CommitObserver, NestedTxnFactory, ObjectRegistry, StmHooks};
pub use manager::{SuspendToken, TransactionManager};
pub use metrics::MetricsSnapshot;
pub use parallel::{ParallelTask, TaskMode};
pub use transaction::{CommitInfo, Transaction};
pub use view::TxnView;
pub use write_set::PendingWrite;

//! Core types for the strata STM engine
//!
//! This crate defines the vocabulary shared by every layer of the engine:
//! - [`CellId`], [`TxnId`], [`Version`]: identities and the global version clock
//! - [`StmError`] / [`StmResult`]: the error taxonomy
//! - [`StmConfig`]: engine configuration
//! - [`TxnMode`] / [`TransactionStatus`]: transaction state machine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod mode;
pub mod types;

pub use config::StmConfig;
pub use error::{ConflictKind, StmError, StmResult};
pub use mode::{NestedKind, TransactionStatus, TxnMode};
pub use types::{CellId, TxnId, Version, GENESIS_VERSION};

/// Bound satisfied by every value that can live inside a versioned cell.
///
/// Values are cloned out of the version chain on every read, so cheap clones
/// (integers, `Arc`s, small structs) are preferred.
pub trait CellValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CellValue for T {}

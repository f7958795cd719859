//! Cell-side access methods
//!
//! `cell.get(&mut txn)` and `cell.put(&mut txn, v)` read the same as the
//! transaction-side calls they forward to.

use crate::transaction::Transaction;
use stm_core::{CellValue, StmResult};
use stm_storage::VersionedCell;

/// Transactional access on [`VersionedCell`]
pub trait TxnCellExt<T> {
    /// Read through `txn`
    fn get(&self, txn: &mut Transaction<'_>) -> StmResult<T>;

    /// Buffer a write in `txn`
    fn put(&self, txn: &mut Transaction<'_>, value: T) -> StmResult<()>;

    /// Read, transform and write back in one step
    fn modify(&self, txn: &mut Transaction<'_>, f: impl FnOnce(T) -> T) -> StmResult<T>
    where
        Self: Sized;
}

impl<T: CellValue> TxnCellExt<T> for VersionedCell<T> {
    fn get(&self, txn: &mut Transaction<'_>) -> StmResult<T> {
        txn.read(self)
    }

    fn put(&self, txn: &mut Transaction<'_>, value: T) -> StmResult<()> {
        txn.write(self, value)
    }

    fn modify(&self, txn: &mut Transaction<'_>, f: impl FnOnce(T) -> T) -> StmResult<T> {
        let next = f(txn.read(self)?);
        txn.write(self, next.clone())?;
        Ok(next)
    }
}

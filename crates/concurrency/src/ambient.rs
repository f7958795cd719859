//! Thread-bound "current transaction"
//!
//! Explicit handles are the primary API. This module layers an implicit
//! style on top: one top-level transaction may be bound to the calling
//! thread, and the free functions here operate on it.
//!
//! ```text
//! begin ──► bound ──commit / abort──► unbound
//!             │  ▲
//!     suspend │  │ resume (any thread)
//!             ▼  │
//!          parked in the manager
//! ```

use crate::manager::{SuspendToken, TransactionManager};
use crate::transaction::{CommitInfo, Transaction};
use std::cell::RefCell;
use stm_core::{StmError, StmResult, TxnId};

thread_local! {
    static CURRENT: RefCell<Option<Transaction<'static>>> = const { RefCell::new(None) };
}

fn no_current() -> StmError {
    StmError::illegal("no transaction is bound to this thread")
}

/// Bind an existing top-level transaction to this thread
pub fn bind(txn: Transaction<'static>) -> StmResult<()> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(bound) = slot.as_ref() {
            return Err(StmError::illegal(format!(
                "{} is already bound to this thread",
                bound.id()
            )));
        }
        *slot = Some(txn);
        Ok(())
    })
}

/// Detach the bound transaction, if any
pub fn unbind() -> Option<Transaction<'static>> {
    CURRENT.with(|slot| slot.borrow_mut().take())
}

/// Begin a transaction and bind it to this thread
pub fn begin(manager: &TransactionManager, read_only: bool) -> StmResult<TxnId> {
    if is_bound() {
        return Err(StmError::illegal("a transaction is already bound to this thread"));
    }
    let txn = manager.begin(read_only);
    let id = txn.id();
    bind(txn)?;
    Ok(id)
}

/// Id of the bound transaction
pub fn current_id() -> Option<TxnId> {
    CURRENT.with(|slot| slot.borrow().as_ref().map(Transaction::id))
}

/// Whether a transaction is bound to this thread
pub fn is_bound() -> bool {
    current_id().is_some()
}

/// Run `f` against the bound transaction
///
/// The transaction is detached while `f` runs, so `f` may not use the
/// ambient functions itself.
pub fn with_current<R>(f: impl FnOnce(&mut Transaction<'static>) -> StmResult<R>) -> StmResult<R> {
    let mut txn = unbind().ok_or_else(no_current)?;
    let result = f(&mut txn);
    CURRENT.with(|slot| *slot.borrow_mut() = Some(txn));
    result
}

/// Commit and unbind the bound transaction
pub fn commit() -> StmResult<CommitInfo> {
    unbind().ok_or_else(no_current)?.commit()
}

/// Abort and unbind the bound transaction
pub fn abort() -> StmResult<()> {
    unbind().ok_or_else(no_current)?.abort();
    Ok(())
}

/// Park the bound transaction in `manager`
pub fn suspend(manager: &TransactionManager) -> StmResult<SuspendToken> {
    manager.suspend(unbind().ok_or_else(no_current)?)
}

/// Resume a parked transaction and bind it to this thread
pub fn resume(manager: &TransactionManager, token: SuspendToken) -> StmResult<TxnId> {
    if is_bound() {
        return Err(StmError::illegal("a transaction is already bound to this thread"));
    }
    let txn = manager.resume(token)?;
    let id = txn.id();
    bind(txn)?;
    Ok(id)
}

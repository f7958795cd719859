//! Transaction context
//!
//! A [`Transaction`] is one attempt at an atomic unit of work. It buffers
//! writes, records the versions it read, and either commits (publishing all
//! writes at one new version) or aborts (discarding everything).
//!
//! ## Snapshot
//!
//! A top-level transaction anchors itself on the head of the commit sequence
//! when it begins. Every read returns the newest version whose number is
//! `<=` that snapshot, so two reads of the same cell without an intervening
//! write always agree.
//!
//! ## Nesting
//!
//! Child contexts borrow their parent (`Transaction<'p>`). They read through
//! the parent's pending writes via [`TxnView`], buffer their own writes, and
//! hand everything back as [`ChildEffects`] when they finish. A child that
//! fails is simply dropped; its parent is untouched.
//!
//! ## Lifecycle
//!
//! ```text
//! begin ──► Active ──commit──► Committed
//!             │
//!             └──abort / conflict / drop──► Aborted
//! ```
//!
//! A top-level context can leave its thread in between (see
//! [`TransactionManager::suspend`](crate::TransactionManager::suspend)); it
//! stays `Active` and keeps its snapshot anchored while suspended.

use crate::manager::EngineShared;
use crate::view::{ChildEffects, TxnView};
use crate::write_set::{merge_write, PendingWrite, ReadEntry, ReadSet, TypedWrite, WriteSet};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use stm_core::{
    CellId, CellValue, NestedKind, StmError, StmResult, TransactionStatus, TxnId, TxnMode, Version,
};
use stm_storage::{CommitRecord, VersionedCell};

/// Outcome of a successful top-level commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Committed transaction
    pub txn_id: TxnId,
    /// Version published, or the snapshot version for read-only commits
    pub version: Version,
    /// Cells written (plain writes and accumulator deltas)
    pub writes: usize,
    /// Whether the commit skipped the commit section
    pub read_only: bool,
}

/// A transaction context
///
/// Obtained from [`TransactionManager::begin`](crate::TransactionManager::begin)
/// for top-level work, or handed to the body of [`Transaction::nested`] and
/// [`Transaction::run_parallel`] tasks.
pub struct Transaction<'p> {
    pub(crate) id: TxnId,
    pub(crate) shared: Arc<EngineShared>,
    /// Anchor on the commit sequence (top-level only)
    anchor: Option<Arc<CommitRecord>>,
    pub(crate) snapshot: Version,
    parent: Option<&'p dyn TxnView>,
    /// Shared scratch of unsafe parallel siblings
    scratch: Option<&'p Mutex<WriteSet>>,
    kind: Option<NestedKind>,
    pub(crate) mode: TxnMode,
    pub(crate) status: TransactionStatus,
    pub(crate) read_set: ReadSet,
    /// Cells a child observed, tracked in every mode for sibling validation
    touched: FxHashSet<CellId>,
    pub(crate) writes: WriteSet,
    pub(crate) deltas: WriteSet,
}

impl Transaction<'static> {
    pub(crate) fn begin(shared: Arc<EngineShared>, mode: TxnMode) -> Self {
        let id = shared.next_txn_id();
        let anchor = shared.sequence.anchor();
        let snapshot = anchor.version();
        shared.metrics.record_start();
        tracing::trace!(txn_id = %id, snapshot, %mode, "begin");

        Transaction {
            id,
            shared,
            anchor: Some(anchor),
            snapshot,
            parent: None,
            scratch: None,
            kind: None,
            mode,
            status: TransactionStatus::Active,
            read_set: ReadSet::default(),
            touched: FxHashSet::default(),
            writes: WriteSet::default(),
            deltas: WriteSet::default(),
        }
    }
}

impl<'p> Transaction<'p> {
    // === Accessors ===

    /// Transaction id (children share their top-level ancestor's id)
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current mode
    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    /// Current lifecycle status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Version of the snapshot every read observes
    pub fn snapshot(&self) -> Version {
        self.snapshot
    }

    /// Kind of child context, `None` for top-level transactions
    pub fn nested_kind(&self) -> Option<NestedKind> {
        self.kind
    }

    /// Check if this is a child context
    pub fn is_nested(&self) -> bool {
        self.kind.is_some()
    }

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Number of cells in the read-set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of cells with a buffered write or delta
    pub fn write_count(&self) -> usize {
        self.writes.len() + self.deltas.len()
    }

    /// Ensure transaction is in Active state
    pub fn ensure_active(&self) -> StmResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StmError::NotActive {
                txn_id: self.id,
                state: self.status.to_string(),
            })
        }
    }

    /// Error a body returns to abort on purpose
    pub fn abort_error(&self, reason: impl Into<String>) -> StmError {
        StmError::Aborted {
            txn_id: self.id,
            reason: reason.into(),
        }
    }

    // === Cell Operations ===

    /// Read a cell
    ///
    /// Returns the pending value if this context (or an enclosing one) wrote
    /// the cell, else the newest version visible at the snapshot.
    pub fn read<T: CellValue>(&mut self, cell: &VersionedCell<T>) -> StmResult<T> {
        self.ensure_active()?;
        let id = cell.id();
        if self.kind.is_some() {
            self.touched.insert(id);
        }

        if let Some(value) = self.pending_value::<T>(id)? {
            return Ok(value);
        }

        let (version, value) = cell.read_at(self.snapshot)?;
        if self.mode.tracks_reads() {
            self.read_set.entry(id).or_insert_with(|| ReadEntry {
                cell: cell.erased(),
                version,
            });
        }
        Ok(value)
    }

    /// Buffer a write of `value` to a cell
    ///
    /// A speculative context upgrades to read-write; a strict read-only
    /// context fails with `IllegalOperation`.
    pub fn write<T: CellValue>(&mut self, cell: &VersionedCell<T>, value: T) -> StmResult<()> {
        self.ensure_active()?;
        self.ensure_writable()?;
        let write = Box::new(TypedWrite::new(cell.clone(), value));
        self.buffer_write(cell.id(), write)
    }

    /// Create a cell and announce it to the object registry
    ///
    /// The cell exists immediately at the genesis version whatever happens
    /// to this transaction.
    pub fn new_cell<T: CellValue>(&self, initial: T) -> VersionedCell<T> {
        self.shared.new_cell(initial)
    }

    /// Buffer a commutative delta for `id`, folding it into any pending one
    ///
    /// Deltas never enter the read-set, so they never cause conflicts.
    pub fn stage_delta(&mut self, id: CellId, delta: Box<dyn PendingWrite>) -> StmResult<()> {
        self.ensure_active()?;
        self.ensure_writable()?;
        merge_write(&mut self.deltas, id, delta)
    }

    fn pending_value<T: CellValue>(&self, id: CellId) -> StmResult<Option<T>> {
        let mut found: Option<Option<T>> = None;
        self.visit_write(id, &mut |write| {
            found = Some(
                write
                    .as_any()
                    .downcast_ref::<TypedWrite<T>>()
                    .map(|typed| typed.value().clone()),
            );
        });
        match found {
            None => Ok(None),
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => Err(StmError::internal(format!(
                "pending write for {} holds a different value type",
                id
            ))),
        }
    }

    fn ensure_writable(&mut self) -> StmResult<()> {
        match self.mode.upgrade() {
            None => Err(StmError::illegal(format!(
                "write inside read-only transaction {}",
                self.id
            ))),
            Some(next) => {
                if next != self.mode {
                    tracing::debug!(txn_id = %self.id, from = %self.mode, "upgrading to read-write");
                    self.mode = next;
                }
                Ok(())
            }
        }
    }

    fn buffer_write(&mut self, id: CellId, write: Box<dyn PendingWrite>) -> StmResult<()> {
        match self.scratch {
            Some(scratch) => merge_write(&mut scratch.lock(), id, write),
            None => merge_write(&mut self.writes, id, write),
        }
    }

    // === Lifecycle ===

    /// Commit a top-level transaction
    ///
    /// Read-only work (no writes, no deltas) returns without entering the
    /// commit section. Otherwise the read-set is validated and all writes
    /// are published at one new version. On conflict nothing is published.
    ///
    /// # Errors
    /// - `Conflict` if a read is stale or a commit observer vetoes
    /// - `IllegalOperation` on a child context (children finish into their parent)
    pub fn commit(mut self) -> StmResult<CommitInfo> {
        self.ensure_active()?;
        if self.kind.is_some() {
            return Err(StmError::illegal(
                "nested transactions finish into their parent, not the commit sequence",
            ));
        }
        let shared = Arc::clone(&self.shared);
        shared.commit(&mut self)
    }

    /// Abort, discarding all buffered writes
    pub fn abort(mut self) {
        self.abort_with("aborted by caller");
    }

    pub(crate) fn abort_with(&mut self, reason: &str) {
        if self.is_active() {
            tracing::debug!(txn_id = %self.id, reason, "abort");
            self.finish(TransactionStatus::Aborted {
                reason: reason.to_string(),
            });
        }
    }

    /// Move to a terminal state, releasing the snapshot anchor
    pub(crate) fn finish(&mut self, status: TransactionStatus) {
        debug_assert!(status.is_terminal());
        if let Some(anchor) = self.anchor.take() {
            anchor.release();
        }
        if self.kind.is_none() && matches!(status, TransactionStatus::Aborted { .. }) {
            self.shared.metrics.record_abort();
        }
        self.writes.clear();
        self.deltas.clear();
        self.status = status;
    }

    // === Nesting ===

    /// Run `body` in a nested child context
    ///
    /// On `Ok` the child's reads and writes become the parent's; on `Err`
    /// the child is discarded and the parent is left as it was.
    pub fn nested<R>(
        &mut self,
        body: impl FnOnce(&mut Transaction<'_>) -> StmResult<R>,
    ) -> StmResult<R> {
        self.ensure_active()?;
        let (value, effects) = {
            let mut child = self.child(&*self, NestedKind::Nested, None);
            let value = body(&mut child)?;
            (value, child.into_effects()?)
        };
        self.absorb_effects(effects)?;
        Ok(value)
    }

    /// Construct a child reading through `view`
    pub(crate) fn child<'c>(
        &self,
        view: &'c dyn TxnView,
        kind: NestedKind,
        scratch: Option<&'c Mutex<WriteSet>>,
    ) -> Transaction<'c> {
        Transaction {
            id: self.id,
            shared: Arc::clone(&self.shared),
            anchor: None,
            snapshot: self.snapshot,
            parent: Some(view),
            scratch,
            kind: Some(kind),
            mode: self.shared.hooks.child_mode(kind, self.mode),
            status: TransactionStatus::Active,
            read_set: ReadSet::default(),
            touched: FxHashSet::default(),
            writes: WriteSet::default(),
            deltas: WriteSet::default(),
        }
    }

    /// Finish a child, handing its effects to the caller
    pub(crate) fn into_effects(mut self) -> StmResult<ChildEffects> {
        self.ensure_active()?;
        let effects = ChildEffects {
            read_set: std::mem::take(&mut self.read_set),
            touched: std::mem::take(&mut self.touched),
            writes: std::mem::take(&mut self.writes),
            deltas: std::mem::take(&mut self.deltas),
        };
        self.status = TransactionStatus::Committed;
        Ok(effects)
    }

    /// Merge a finished child's effects into this context
    pub(crate) fn absorb_effects(&mut self, effects: ChildEffects) -> StmResult<()> {
        if effects.has_writes() {
            self.ensure_writable()?;
        }
        if self.mode.tracks_reads() {
            for (id, entry) in effects.read_set {
                self.read_set.entry(id).or_insert(entry);
            }
        }
        if self.kind.is_some() {
            self.touched.extend(effects.touched);
        }
        for (id, write) in effects.writes {
            self.buffer_write(id, write)?;
        }
        for (id, delta) in effects.deltas {
            merge_write(&mut self.deltas, id, delta)?;
        }
        Ok(())
    }
}

impl TxnView for Transaction<'_> {
    fn snapshot_version(&self) -> Version {
        self.snapshot
    }

    fn visit_write(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite)) -> bool {
        if let Some(write) = self.writes.get(&id) {
            f(write.as_ref());
            return true;
        }
        if let Some(scratch) = self.scratch {
            if let Some(write) = scratch.lock().get(&id) {
                f(write.as_ref());
                return true;
            }
        }
        match self.parent {
            Some(parent) => parent.visit_write(id, f),
            None => false,
        }
    }

    fn visit_deltas(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite)) {
        if let Some(delta) = self.deltas.get(&id) {
            f(delta.as_ref());
        }
        if let Some(parent) = self.parent {
            parent.visit_deltas(id, f);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            self.abort_with("dropped while active");
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_count())
            .finish()
    }
}

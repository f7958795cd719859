//! Read-set and write-set entries
//!
//! Write-sets are heterogeneous: one transaction may write cells of many
//! value types. Each buffered write is a boxed [`PendingWrite`] that knows
//! how to merge a newer write for the same cell and how to publish itself
//! inside the commit section.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::{Arc, Weak};
use stm_core::{CellId, CellValue, StmError, StmResult, Version};
use stm_storage::{ErasedCell, VersionedCell};

/// A buffered write waiting for commit
///
/// Implemented by plain cell writes ([`TypedWrite`]) and by commutative
/// deltas such as the accumulator cell's.
pub trait PendingWrite: Send + Sync {
    /// Cell this write targets
    fn cell_id(&self) -> CellId;

    /// Newest version already committed to the target cell
    fn committed_version(&self) -> Version;

    /// Borrow as `Any` for typed lookups
    fn as_any(&self) -> &dyn Any;

    /// Convert into `Any` for typed merges
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Fold a newer write for the same cell into this one
    ///
    /// Plain writes replace their value; deltas combine.
    fn absorb(&mut self, newer: Box<dyn PendingWrite>) -> StmResult<()>;

    /// Install the write as a new version of its cell.
    ///
    /// Called exactly once, from inside the commit section.
    fn publish(self: Box<Self>, version: Version) -> StmResult<Weak<dyn ErasedCell>>;
}

/// Buffered writes keyed by cell
pub type WriteSet = FxHashMap<CellId, Box<dyn PendingWrite>>;

/// Read-set entry: which version of a cell a transaction observed
#[derive(Clone)]
pub struct ReadEntry {
    /// The cell, kept alive until validation
    pub cell: Arc<dyn ErasedCell>,
    /// Version observed
    pub version: Version,
}

impl std::fmt::Debug for ReadEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadEntry")
            .field("cell", &self.cell.id())
            .field("version", &self.version)
            .finish()
    }
}

/// Observed versions keyed by cell
pub type ReadSet = FxHashMap<CellId, ReadEntry>;

/// Merge `newer` into `set`, absorbing into an existing entry if present
pub(crate) fn merge_write(
    set: &mut WriteSet,
    id: CellId,
    newer: Box<dyn PendingWrite>,
) -> StmResult<()> {
    match set.get_mut(&id) {
        Some(existing) => existing.absorb(newer),
        None => {
            set.insert(id, newer);
            Ok(())
        }
    }
}

/// A plain buffered write of a new value
pub struct TypedWrite<T> {
    cell: VersionedCell<T>,
    value: T,
}

impl<T: CellValue> TypedWrite<T> {
    /// Buffer `value` for `cell`
    pub fn new(cell: VersionedCell<T>, value: T) -> Self {
        Self { cell, value }
    }

    /// The buffered value
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: CellValue> PendingWrite for TypedWrite<T> {
    fn cell_id(&self) -> CellId {
        self.cell.id()
    }

    fn committed_version(&self) -> Version {
        self.cell.latest_version()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn absorb(&mut self, newer: Box<dyn PendingWrite>) -> StmResult<()> {
        let id = newer.cell_id();
        match newer.into_any().downcast::<TypedWrite<T>>() {
            Ok(newer) => {
                self.value = newer.value;
                Ok(())
            }
            Err(_) => Err(StmError::internal(format!(
                "write-set entry for {} changed value type",
                id
            ))),
        }
    }

    fn publish(self: Box<Self>, version: Version) -> StmResult<Weak<dyn ErasedCell>> {
        let TypedWrite { cell, value } = *self;
        cell.install(value, version)?;
        Ok(cell.downgrade())
    }
}

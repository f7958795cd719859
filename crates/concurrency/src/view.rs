//! Read-through views of enclosing transactions
//!
//! A child context never copies its parent's pending state. Instead it reads
//! through a [`TxnView`]: the parent transaction itself for sequential
//! nesting and the first parallel round, or a [`BatchOverlay`] stacked on
//! the parent when a parallel sibling is retried against the results its
//! siblings have already merged.

use crate::write_set::{merge_write, PendingWrite, ReadSet, WriteSet};
use rustc_hash::FxHashSet;
use stm_core::{CellId, StmResult, Version};

/// Pending state visible to child contexts
pub trait TxnView: Sync {
    /// Snapshot version shared by the whole transaction tree
    fn snapshot_version(&self) -> Version;

    /// Visit the innermost pending write for `id`.
    ///
    /// Returns `true` if a write was found.
    fn visit_write(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite)) -> bool;

    /// Visit every pending delta for `id` at this level and all enclosing levels
    fn visit_deltas(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite));
}

/// Effects of a finished child context, waiting to be merged into its parent
#[derive(Default)]
pub struct ChildEffects {
    pub(crate) read_set: ReadSet,
    pub(crate) touched: FxHashSet<CellId>,
    pub(crate) writes: WriteSet,
    pub(crate) deltas: WriteSet,
}

impl ChildEffects {
    /// Whether the child buffered any write or delta
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty() || !self.deltas.is_empty()
    }

    /// Cells the child observed or wrote
    pub(crate) fn footprint(&self) -> impl Iterator<Item = &CellId> {
        self.touched.iter().chain(self.writes.keys())
    }
}

/// Effects of the parallel siblings merged so far, layered over the parent
pub struct BatchOverlay<'b> {
    below: &'b dyn TxnView,
    effects: ChildEffects,
    written: FxHashSet<CellId>,
}

impl<'b> BatchOverlay<'b> {
    /// Start an empty batch over `below`
    pub fn new(below: &'b dyn TxnView) -> Self {
        Self {
            below,
            effects: ChildEffects::default(),
            written: FxHashSet::default(),
        }
    }

    /// First cell in `effects` that an already-merged sibling wrote
    pub fn overlap(&self, effects: &ChildEffects) -> Option<CellId> {
        effects
            .footprint()
            .find(|id| self.written.contains(id))
            .copied()
    }

    /// Merge a sibling's effects without any check
    pub fn merge(&mut self, effects: ChildEffects) -> StmResult<()> {
        for (id, entry) in effects.read_set {
            self.effects.read_set.entry(id).or_insert(entry);
        }
        self.effects.touched.extend(effects.touched);
        self.merge_writes(effects.writes)?;
        for (id, delta) in effects.deltas {
            // a later sibling reading the accumulator must see this delta
            self.written.insert(id);
            merge_write(&mut self.effects.deltas, id, delta)?;
        }
        Ok(())
    }

    /// Merge plain writes (the unsafe siblings' shared scratch)
    pub fn merge_writes(&mut self, writes: WriteSet) -> StmResult<()> {
        for (id, write) in writes {
            self.written.insert(id);
            merge_write(&mut self.effects.writes, id, write)?;
        }
        Ok(())
    }

    /// Everything merged, ready for the parent
    pub fn into_effects(self) -> ChildEffects {
        self.effects
    }
}

impl TxnView for BatchOverlay<'_> {
    fn snapshot_version(&self) -> Version {
        self.below.snapshot_version()
    }

    fn visit_write(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite)) -> bool {
        if let Some(write) = self.effects.writes.get(&id) {
            f(write.as_ref());
            return true;
        }
        self.below.visit_write(id, f)
    }

    fn visit_deltas(&self, id: CellId, f: &mut dyn FnMut(&dyn PendingWrite)) {
        if let Some(delta) = self.effects.deltas.get(&id) {
            f(delta.as_ref());
        }
        self.below.visit_deltas(id, f);
    }
}

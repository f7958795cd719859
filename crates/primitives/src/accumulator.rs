//! Accumulator cell
//!
//! A cell for commutative updates: counters, sums, set unions.
//!
//! ## Design
//!
//! `put` never reads the base cell. It stages a delta in the transaction,
//! folding repeated puts together with `combine`. At commit, inside the
//! commit section, the delta is folded into the newest committed base value.
//! Two transactions that only `put` to the same accumulator therefore never
//! conflict on it, whatever order they commit in.
//!
//! `get` does read the base cell (it enters the read-set like any read) and
//! returns it combined with every delta pending in this transaction and its
//! enclosing ones.
//!
//! ## Requirements on `combine`
//!
//! - Associative and commutative, so the final value is independent of
//!   commit order
//! - Cheap and pure: it runs inside the commit section

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use stm_concurrency::{PendingWrite, Transaction, TxnView};
use stm_core::{CellId, CellValue, StmError, StmResult, Version};
use stm_storage::{ErasedCell, VersionedCell};

/// Shared combine function
pub type Combine<T> = Arc<dyn Fn(&T, &T) -> T + Send + Sync>;

/// Cell whose per-transaction updates merge at commit instead of conflicting
pub struct AccumulatorCell<T> {
    base: VersionedCell<T>,
    combine: Combine<T>,
}

impl<T> Clone for AccumulatorCell<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            combine: Arc::clone(&self.combine),
        }
    }
}

impl<T: CellValue> AccumulatorCell<T> {
    /// Create an accumulator holding `initial`
    pub fn new(initial: T, combine: impl Fn(&T, &T) -> T + Send + Sync + 'static) -> Self {
        Self::with_base(VersionedCell::new(initial), combine)
    }

    /// Wrap an existing cell as the committed base
    pub fn with_base(
        base: VersionedCell<T>,
        combine: impl Fn(&T, &T) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            base,
            combine: Arc::new(combine),
        }
    }

    /// Identity of the base cell
    pub fn id(&self) -> CellId {
        self.base.id()
    }

    /// The committed base cell
    pub fn base(&self) -> &VersionedCell<T> {
        &self.base
    }

    /// Base value at the snapshot combined with all pending deltas
    pub fn get(&self, txn: &mut Transaction<'_>) -> StmResult<T> {
        let base = txn.read(&self.base)?;

        // innermost first
        let mut pending = Vec::new();
        let mut mismatched = false;
        txn.visit_deltas(self.id(), &mut |write| {
            match write.as_any().downcast_ref::<DeltaWrite<T>>() {
                Some(delta) => pending.push(delta.delta.clone()),
                None => mismatched = true,
            }
        });
        if mismatched {
            return Err(StmError::internal(format!(
                "pending delta for {} holds a different value type",
                self.id()
            )));
        }

        Ok(pending
            .iter()
            .rev()
            .fold(base, |acc, delta| (self.combine)(&acc, delta)))
    }

    /// Stage `delta` for commit
    ///
    /// Does not read the base cell and never causes a conflict.
    pub fn put(&self, txn: &mut Transaction<'_>, delta: T) -> StmResult<()> {
        txn.stage_delta(
            self.id(),
            Box::new(DeltaWrite {
                base: self.base.clone(),
                combine: Arc::clone(&self.combine),
                delta,
            }),
        )
    }

    /// Newest committed value, outside any transaction
    pub fn load(&self) -> T {
        self.base.load()
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for AccumulatorCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorCell")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// A staged accumulator delta
struct DeltaWrite<T> {
    base: VersionedCell<T>,
    combine: Combine<T>,
    delta: T,
}

impl<T: CellValue> PendingWrite for DeltaWrite<T> {
    fn cell_id(&self) -> CellId {
        self.base.id()
    }

    fn committed_version(&self) -> Version {
        self.base.latest_version()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn absorb(&mut self, newer: Box<dyn PendingWrite>) -> StmResult<()> {
        let id = newer.cell_id();
        match newer.into_any().downcast::<DeltaWrite<T>>() {
            Ok(newer) => {
                self.delta = (self.combine)(&self.delta, &newer.delta);
                Ok(())
            }
            Err(_) => Err(StmError::internal(format!(
                "delta for {} changed value type",
                id
            ))),
        }
    }

    fn publish(self: Box<Self>, version: Version) -> StmResult<Weak<dyn ErasedCell>> {
        let DeltaWrite {
            base,
            combine,
            delta,
        } = *self;
        base.fold(version, |current| combine(current, &delta))?;
        tracing::trace!(cell = %base.id(), version, "accumulator delta folded");
        Ok(base.downgrade())
    }
}

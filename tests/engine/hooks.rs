//! Hook points installed through the builder

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_stm::prelude::*;
use strata_stm::{
    CellId, CommitObserver, ConflictKind, NestedKind, NestedTxnFactory, ObjectRegistry, StmError,
    TxnId,
};

#[derive(Default)]
struct CountingRegistry {
    cells: AtomicUsize,
}

impl ObjectRegistry for CountingRegistry {
    fn register(&self, _cell: CellId) {
        self.cells.fetch_add(1, Ordering::SeqCst);
    }
}

struct Guard {
    protected: CellId,
}

impl CommitObserver for Guard {
    fn before_commit(&self, _txn: TxnId, written: &[CellId]) -> std::result::Result<(), String> {
        if written.contains(&self.protected) {
            Err(format!("{} is protected", self.protected))
        } else {
            Ok(())
        }
    }
}

struct ReadOnlyChildren;

impl NestedTxnFactory for ReadOnlyChildren {
    fn child_mode(&self, kind: NestedKind, parent: TxnMode) -> TxnMode {
        match kind {
            NestedKind::Nested => TxnMode::ReadOnly,
            _ => parent,
        }
    }
}

#[test]
fn registry_hears_about_every_cell() {
    let registry = Arc::new(CountingRegistry::default());
    let stm = Stm::builder()
        .object_registry(registry.clone())
        .build()
        .unwrap();

    stm.new_cell(0u8);
    stm.new_accumulator(0u64, |a, b| a + b);
    stm.atomically(|txn| {
        txn.new_cell(String::new());
        Ok(())
    })
    .unwrap();

    assert_eq!(registry.cells.load(Ordering::SeqCst), 3);
}

#[test]
fn observer_veto_is_a_conflict() {
    let mut builder = Stm::builder();
    let protected = VersionedCell::new(0u32);
    builder = builder.commit_observer(Arc::new(Guard {
        protected: protected.id(),
    }));
    let stm = builder.build().unwrap();
    let free = stm.new_cell(0u32);

    let mut txn = stm.begin(false);
    txn.write(&protected, 1).unwrap();
    let err = txn.commit().unwrap_err();
    assert!(matches!(err.conflict_kind(), Some(ConflictKind::Vetoed { .. })));
    assert_eq!(protected.load(), 0);

    stm.atomically(|txn| txn.write(&free, 1)).unwrap();
    assert_eq!(free.load(), 1);
    assert_eq!(stm.metrics().conflicts, 1);
}

#[test]
fn factory_chooses_child_modes() {
    let stm = Stm::builder()
        .nested_factory(Arc::new(ReadOnlyChildren))
        .build()
        .unwrap();
    let x = stm.new_cell(4u32);

    let mut txn = stm.begin(false);
    assert_eq!(txn.nested(|child| child.read(&x)).unwrap(), 4);
    let err = txn.nested(|child| child.write(&x, 5)).unwrap_err();
    assert!(matches!(err, StmError::IllegalOperation { .. }));

    // parallel children keep the parent's mode
    txn.run_parallel(vec![ParallelTask::validated(|child| child.write(&x, 6))])
        .unwrap();
    txn.commit().unwrap();
    assert_eq!(x.load(), 6);
}

//! Commit-time validation and retry

use std::thread;
use strata_stm::prelude::*;
use strata_stm::{ConflictKind, StmError};

// ============================================================================
// Stale reads
// ============================================================================

#[test]
fn stale_read_conflicts_then_retry_succeeds() {
    let stm = Stm::new();
    let x = stm.new_cell(10i32);

    let mut t1 = stm.begin(false);
    assert_eq!(t1.read(&x).unwrap(), 10);

    let mut t2 = stm.begin(false);
    t2.write(&x, 11).unwrap();
    t2.commit().unwrap();

    t1.write(&x, 12).unwrap();
    let err = t1.commit().unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(
        err.conflict_kind(),
        Some(ConflictKind::StaleRead { read_version: 0, committed_version: 1, .. })
    ));
    assert_eq!(x.load(), 11, "failed commit published nothing");

    let seen = stm
        .atomically(|txn| {
            let v = txn.read(&x)?;
            txn.write(&x, 12)?;
            Ok(v)
        })
        .unwrap();
    assert_eq!(seen, 11);
    assert_eq!(x.load(), 12);

    let metrics = stm.metrics();
    assert_eq!(metrics.conflicts, 1);
    assert_eq!(metrics.committed, 2);
}

#[test]
fn conflict_publishes_none_of_the_write_set() {
    let stm = Stm::new();
    let a = stm.new_cell(0u32);
    let b = stm.new_cell(0u32);

    let mut loser = stm.begin(false);
    loser.read(&a).unwrap();
    loser.write(&a, 1).unwrap();
    loser.write(&b, 1).unwrap();

    stm.atomically(|txn| txn.write(&a, 5)).unwrap();

    assert!(loser.commit().unwrap_err().is_retryable());
    assert_eq!(a.load(), 5);
    assert_eq!(b.load(), 0);
    assert_eq!(b.version_count(), 1);
}

#[test]
fn blind_writes_do_not_conflict() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);

    let mut t1 = stm.begin(false);
    t1.write(&x, 1).unwrap();
    stm.atomically(|txn| txn.write(&x, 2)).unwrap();
    t1.commit().unwrap();

    assert_eq!(x.load(), 1, "last committer wins");
    assert_eq!(stm.metrics().conflicts, 0);
}

#[test]
fn read_only_transactions_always_commit() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);

    let mut reader = stm.begin(true);
    reader.read(&x).unwrap();
    stm.atomically(|txn| txn.write(&x, 9)).unwrap();

    let info = reader.commit().unwrap();
    assert!(info.read_only);
    assert_eq!(stm.metrics().read_only_commits, 1);
}

// ============================================================================
// Modes
// ============================================================================

#[test]
fn speculative_transaction_upgrades_on_first_write() {
    let stm = Stm::new();
    let x = stm.new_cell(1u32);

    let mut txn = stm.begin(true);
    assert_eq!(txn.mode(), TxnMode::Speculative);
    let v = txn.read(&x).unwrap();
    txn.write(&x, v * 10).unwrap();
    assert_eq!(txn.mode(), TxnMode::ReadWrite);

    let info = txn.commit().unwrap();
    assert!(!info.read_only);
    assert_eq!(info.version, 1);
    assert_eq!(x.load(), 10);
}

#[test]
fn upgraded_transaction_is_validated() {
    let stm = Stm::new();
    let x = stm.new_cell(1u32);

    let mut txn = stm.begin(true);
    let v = txn.read(&x).unwrap();
    stm.atomically(|t| t.write(&x, 2)).unwrap();

    // the read happened before the upgrade and is still validated
    txn.write(&x, v + 10).unwrap();
    let err = txn.commit().unwrap_err();
    assert!(matches!(
        err.conflict_kind(),
        Some(ConflictKind::StaleRead {
            read_version: 0,
            committed_version: 1,
            ..
        })
    ));
    assert_eq!(x.load(), 2);
}

#[test]
fn speculative_counter_loses_no_increments() {
    let stm = Stm::builder().max_retries(100_000).build().unwrap();
    let counter = stm.new_cell(0u64);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..250 {
                    stm.atomically_read_only(|txn| {
                        let v = txn.read(&counter)?;
                        txn.write(&counter, v + 1)
                    })
                    .unwrap();
                }
            });
        }
    });

    assert_eq!(counter.load(), 1000);
    let metrics = stm.metrics();
    assert_eq!(metrics.aborted, metrics.conflicts);
}

#[test]
fn strict_read_only_rejects_writes() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);

    let mut txn = stm.begin_with(TxnMode::ReadOnly);
    let err = txn.write(&x, 1).unwrap_err();
    assert!(matches!(err, StmError::IllegalOperation { .. }));
    assert!(!err.is_retryable());
    txn.commit().unwrap();
    assert_eq!(x.load(), 0);
}

#[test]
fn explicit_abort_is_not_retried() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);
    let err = stm
        .atomically(|txn| {
            txn.write(&x, 1)?;
            Err::<(), _>(txn.abort_error("changed my mind"))
        })
        .unwrap_err();
    assert!(matches!(err, Error::Aborted(_)));
    assert_eq!(x.load(), 0);
}

// ============================================================================
// Nesting
// ============================================================================

#[test]
fn nested_abort_leaves_parent_intact() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);
    let y = stm.new_cell(0u32);

    stm.atomically(|txn| {
        txn.write(&x, 1)?;
        let child = txn.nested(|child| {
            child.write(&y, 1)?;
            Err::<(), _>(child.abort_error("inner"))
        });
        assert!(child.is_err());
        assert_eq!(txn.read(&y)?, 0);
        txn.nested(|child| {
            let v = child.read(&x)?;
            child.write(&y, v + 1)
        })
    })
    .unwrap();

    assert_eq!(x.load(), 1);
    assert_eq!(y.load(), 2);
}

#[test]
fn nested_reads_are_validated_with_the_parent() {
    let stm = Stm::new();
    let x = stm.new_cell(0u32);
    let out = stm.new_cell(0u32);

    let mut txn = stm.begin(false);
    txn.nested(|child| {
        let v = child.read(&x)?;
        child.write(&out, v)
    })
    .unwrap();

    stm.atomically(|t| t.write(&x, 3)).unwrap();
    assert!(txn.commit().unwrap_err().is_conflict());
    assert_eq!(out.load(), 0);
}

// ============================================================================
// Retry under contention
// ============================================================================

#[test]
fn contended_counter_loses_no_increments() {
    let stm = Stm::builder().max_retries(100_000).build().unwrap();
    let counter = stm.new_cell(0u64);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..250 {
                    stm.atomically(|txn| counter.modify(txn, |v| v + 1)).unwrap();
                }
            });
        }
    });

    assert_eq!(counter.load(), 1000);
    let metrics = stm.metrics();
    assert_eq!(metrics.committed, 1000);
    assert_eq!(metrics.aborted, metrics.conflicts);
}

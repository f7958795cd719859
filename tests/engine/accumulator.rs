//! Accumulator cells under concurrency

use std::collections::BTreeSet;
use std::thread;
use strata_stm::prelude::*;

#[test]
fn concurrent_puts_merge_without_conflicts() {
    let stm = Stm::new();
    let hits = stm.new_accumulator(0u64, |a, b| a + b);

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..100 {
                    stm.atomically(|txn| hits.put(txn, 1)).unwrap();
                }
            });
        }
    });

    assert_eq!(hits.load(), 200);
    let metrics = stm.metrics();
    assert_eq!(metrics.conflicts, 0);
    assert_eq!(metrics.committed, 200);
}

#[test]
fn get_sees_base_plus_own_deltas() {
    let stm = Stm::new();
    let total = stm.new_accumulator(10i64, |a, b| a + b);

    stm.atomically(|txn| {
        total.put(txn, 5)?;
        total.put(txn, -2)?;
        assert_eq!(total.get(txn)?, 13);
        Ok(())
    })
    .unwrap();

    assert_eq!(total.load(), 13);
}

#[test]
fn get_makes_the_transaction_validate_the_base() {
    let stm = Stm::new();
    let total = stm.new_accumulator(0i64, |a, b| a + b);
    let mirror = stm.new_cell(0i64);

    let mut txn = stm.begin(false);
    let seen = total.get(&mut txn).unwrap();
    txn.write(&mirror, seen).unwrap();

    stm.atomically(|t| total.put(t, 1)).unwrap();
    assert!(txn.commit().unwrap_err().is_conflict());
    assert_eq!(mirror.load(), 0);
}

#[test]
fn non_numeric_combine_merges_sets() {
    let stm = Stm::new();
    let tags = stm.new_accumulator(BTreeSet::<u32>::new(), |a, b| a.union(b).copied().collect());

    thread::scope(|s| {
        for t in 0..4u32 {
            let (stm, tags) = (&stm, &tags);
            s.spawn(move || {
                for i in 0..10 {
                    stm.atomically(|txn| tags.put(txn, BTreeSet::from([t * 100 + i])))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(tags.load().len(), 40);
    assert_eq!(stm.metrics().conflicts, 0);
}

#[test]
fn aborted_deltas_are_discarded() {
    let stm = Stm::new();
    let total = stm.new_accumulator(0u32, |a, b| a + b);

    let mut txn = stm.begin(false);
    total.put(&mut txn, 7).unwrap();
    txn.abort();

    stm.atomically(|txn| total.put(txn, 1)).unwrap();
    assert_eq!(total.load(), 1);
}

#[test]
fn parallel_children_accumulate() {
    let stm = Stm::new();
    let total = stm.new_accumulator(0u64, |a, b| a + b);

    stm.atomically(|txn| {
        let tasks = (1..=8u64)
            .map(|n| {
                let total = &total;
                ParallelTask::validated(move |child| total.put(child, n))
            })
            .collect();
        txn.run_parallel(tasks).map(|_| ())
    })
    .unwrap();

    assert_eq!(total.load(), 36);
    assert_eq!(stm.metrics().parallel_retries, 0);
}

//! Parallel child contexts

use std::collections::HashSet;
use std::sync::Mutex;
use strata_stm::prelude::*;
use strata_stm::{StmError, TaskMode};

fn increment(cell: &VersionedCell<i32>) -> ParallelTask<'_, i32> {
    ParallelTask::validated(move |child| {
        let v = child.read(cell)?;
        child.write(cell, v + 1)?;
        Ok(v)
    })
}

#[test]
fn overlapping_validated_siblings_run_as_if_sequential() {
    let stm = Stm::new();
    let x = stm.new_cell(0i32);

    let results = stm
        .atomically(|txn| {
            assert_eq!(txn.read(&x)?, 0);
            txn.run_parallel(vec![increment(&x), increment(&x)])
        })
        .unwrap();

    assert_eq!(results, vec![0, 1]);
    assert_eq!(x.load(), 2);
    assert_eq!(stm.metrics().parallel_retries, 1);
}

#[test]
fn results_keep_submission_order() {
    let stm = Stm::new();
    let cells: Vec<_> = (0..16).map(|i| stm.new_cell(i * 10)).collect();

    let results = stm
        .atomically(|txn| {
            let tasks = cells
                .iter()
                .map(|cell| ParallelTask::disjoint(move |child| child.read(cell)))
                .collect();
            txn.run_parallel(tasks)
        })
        .unwrap();

    assert_eq!(results, (0..16).map(|i| i * 10).collect::<Vec<_>>());
}

#[test]
fn disjoint_writes_all_land() {
    let stm = Stm::builder().parallelism(4).build().unwrap();
    let cells: Vec<_> = (0..32).map(|_| stm.new_cell(0u32)).collect();

    stm.atomically(|txn| {
        let tasks = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| ParallelTask::disjoint(move |child| child.write(cell, i as u32)))
            .collect();
        txn.run_parallel(tasks).map(|_| ())
    })
    .unwrap();

    for (i, cell) in cells.iter().enumerate() {
        assert_eq!(cell.load(), i as u32);
    }
    assert_eq!(stm.metrics().parallel_retries, 0);
}

#[test]
fn dedicated_pool_runs_tasks_on_named_threads() {
    let stm = Stm::builder().parallelism(2).build().unwrap();
    let names = Mutex::new(HashSet::new());

    stm.atomically_read_only(|txn| {
        let tasks = (0..8)
            .map(|_| {
                let names = &names;
                ParallelTask::disjoint(move |_child| {
                    let name = std::thread::current().name().map(str::to_string);
                    names.lock().unwrap().insert(name);
                    Ok(())
                })
            })
            .collect();
        txn.run_parallel(tasks).map(|_| ())
    })
    .unwrap();

    let names = names.into_inner().unwrap();
    assert!(!names.is_empty());
    for name in names {
        assert!(name.unwrap_or_default().starts_with("stm-parallel-"));
    }
}

#[test]
fn failing_sibling_merges_nothing() {
    let stm = Stm::new();
    let a = stm.new_cell(0u8);
    let b = stm.new_cell(0u8);

    let mut txn = stm.begin(false);
    let err = txn
        .run_parallel(vec![
            ParallelTask::validated(|child| child.write(&a, 1)),
            ParallelTask::validated(|child| Err(child.abort_error("sibling failed"))),
            ParallelTask::validated(|child| child.write(&b, 1)),
        ])
        .unwrap_err();
    assert!(matches!(err, StmError::Aborted { .. }));
    assert_eq!(txn.write_count(), 0);

    txn.commit().unwrap();
    assert_eq!((a.load(), b.load()), (0, 0));
}

#[test]
fn unsafe_tasks_share_one_write_buffer() {
    let stm = Stm::new();
    let shared = stm.new_cell(0u32);
    let own = stm.new_cell(0u32);

    stm.atomically(|txn| {
        let tasks = vec![
            ParallelTask::unsafe_shared(|child| child.write(&shared, 5)),
            ParallelTask::unsafe_shared(|child| child.write(&own, 1)),
        ];
        assert!(tasks.iter().all(|t| t.mode() == TaskMode::Unsafe));
        txn.run_parallel(tasks)?;
        assert_eq!(txn.read(&shared)?, 5);
        Ok(())
    })
    .unwrap();

    assert_eq!(shared.load(), 5);
    assert_eq!(own.load(), 1);
}

#[test]
fn speculative_parent_upgrades_when_children_write() {
    let stm = Stm::new();
    let x = stm.new_cell(0i32);

    let mut txn = stm.begin(true);
    txn.run_parallel(vec![increment(&x)]).unwrap();
    assert_eq!(txn.mode(), TxnMode::ReadWrite);
    txn.commit().unwrap();
    assert_eq!(x.load(), 1);
}

#[test]
fn nested_parallel_inside_nested() {
    let stm = Stm::new();
    let x = stm.new_cell(0i32);

    stm.atomically(|txn| {
        txn.nested(|inner| inner.run_parallel(vec![increment(&x), increment(&x)]))
            .map(|_| ())
    })
    .unwrap();

    assert_eq!(x.load(), 2);
}

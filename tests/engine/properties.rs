//! Property tests for serializability
//!
//! Concurrent workloads must end in a state some serial order of their
//! transactions could produce. Transfers conserve the total; counters lose
//! no increments; readers only ever see conserved totals.

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use strata_stm::prelude::*;

const ACCOUNTS: usize = 6;
const INITIAL_BALANCE: i64 = 1_000;

fn engine() -> Stm {
    Stm::builder().max_retries(u32::MAX).build().unwrap()
}

fn transfer(
    stm: &Stm,
    accounts: &[VersionedCell<i64>],
    from: usize,
    to: usize,
    amount: i64,
) -> Result<bool> {
    stm.atomically(|txn| {
        let balance = txn.read(&accounts[from])?;
        if balance < amount || from == to {
            return Ok(false);
        }
        txn.write(&accounts[from], balance - amount)?;
        let target = txn.read(&accounts[to])?;
        txn.write(&accounts[to], target + amount)?;
        Ok(true)
    })
}

fn total(stm: &Stm, accounts: &[VersionedCell<i64>]) -> i64 {
    stm.atomically_read_only(|txn| {
        let mut sum = 0;
        for account in accounts {
            sum += txn.read(account)?;
        }
        Ok(sum)
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_concurrent_transfers_conserve_total(
        batches in prop::collection::vec(
            prop::collection::vec((0..ACCOUNTS, 0..ACCOUNTS, 1i64..400), 1..40),
            2..5,
        ),
    ) {
        let stm = engine();
        let accounts: Vec<_> = (0..ACCOUNTS).map(|_| stm.new_cell(INITIAL_BALANCE)).collect();

        thread::scope(|s| {
            for batch in &batches {
                let (stm, accounts) = (&stm, &accounts);
                s.spawn(move || {
                    for &(from, to, amount) in batch {
                        transfer(stm, accounts, from, to, amount).unwrap();
                    }
                });
            }
        });

        prop_assert_eq!(total(&stm, &accounts), INITIAL_BALANCE * ACCOUNTS as i64);
        for account in &accounts {
            prop_assert!(account.load() >= 0, "overdrawn account");
        }
    }

    #[test]
    fn prop_counters_lose_no_increments(
        threads in 2usize..6,
        per_thread in 1u64..60,
        cells in 1usize..4,
    ) {
        let stm = engine();
        let counters: Vec<_> = (0..cells).map(|_| stm.new_cell(0u64)).collect();

        thread::scope(|s| {
            for t in 0..threads {
                let (stm, counters) = (&stm, &counters);
                s.spawn(move || {
                    for i in 0..per_thread {
                        let counter = &counters[(t + i as usize) % counters.len()];
                        stm.atomically(|txn| counter.modify(txn, |v| v + 1)).unwrap();
                    }
                });
            }
        });

        let sum: u64 = counters.iter().map(VersionedCell::load).sum();
        prop_assert_eq!(sum, threads as u64 * per_thread);
        prop_assert_eq!(stm.metrics().committed, threads as u64 * per_thread);
    }

    #[test]
    fn prop_accumulator_order_does_not_matter(deltas in prop::collection::vec(-50i64..50, 1..64)) {
        let stm = engine();
        let acc = stm.new_accumulator(0i64, |a, b| a + b);

        thread::scope(|s| {
            for chunk in deltas.chunks(8) {
                let (stm, acc) = (&stm, &acc);
                s.spawn(move || {
                    for &d in chunk {
                        stm.atomically(|txn| acc.put(txn, d)).unwrap();
                    }
                });
            }
        });

        prop_assert_eq!(acc.load(), deltas.iter().sum::<i64>());
        prop_assert_eq!(stm.metrics().conflicts, 0);
    }
}

// ============================================================================
// Randomized stress
// ============================================================================

#[test]
fn readers_only_see_conserved_totals() {
    let stm = engine();
    let accounts: Vec<_> = (0..ACCOUNTS).map(|_| stm.new_cell(INITIAL_BALANCE)).collect();
    let done = AtomicBool::new(false);
    let expected = INITIAL_BALANCE * ACCOUNTS as i64;

    thread::scope(|s| {
        let writers: Vec<_> = (0..4u64)
            .map(|seed| {
                let (stm, accounts) = (&stm, &accounts);
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    for _ in 0..300 {
                        let from = rng.gen_range(0..ACCOUNTS);
                        let to = rng.gen_range(0..ACCOUNTS);
                        let amount = rng.gen_range(1..200);
                        transfer(stm, accounts, from, to, amount).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..2 {
            let (stm, accounts, done) = (&stm, &accounts, &done);
            s.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    assert_eq!(total(stm, accounts), expected);
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(total(&stm, &accounts), expected);
}

#[test]
fn parallel_children_match_sequential_execution() {
    let mut rng = StdRng::seed_from_u64(7);
    let stm = Stm::new();
    let cells: Vec<_> = (0..4).map(|_| stm.new_cell(0i64)).collect();

    for _ in 0..20 {
        let plan: Vec<(usize, i64)> = (0..8)
            .map(|_| (rng.gen_range(0..cells.len()), rng.gen_range(1..10)))
            .collect();

        let before: Vec<i64> = cells.iter().map(VersionedCell::load).collect();
        let observed = stm
            .atomically(|txn| {
                let tasks = plan
                    .iter()
                    .map(|&(index, add)| {
                        let cell = &cells[index];
                        ParallelTask::validated(move |child| {
                            let v = child.read(cell)?;
                            child.write(cell, v + add)?;
                            Ok(v)
                        })
                    })
                    .collect();
                txn.run_parallel(tasks)
            })
            .unwrap();

        // replay the plan one task at a time
        let mut expected = before;
        let mut expected_observed = Vec::with_capacity(plan.len());
        for &(index, add) in &plan {
            expected_observed.push(expected[index]);
            expected[index] += add;
        }

        assert_eq!(observed, expected_observed);
        let after: Vec<i64> = cells.iter().map(VersionedCell::load).collect();
        assert_eq!(after, expected);
    }
}

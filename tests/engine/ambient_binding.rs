//! Thread-bound current transaction

use std::thread;
use strata_stm::{ambient, StmError};
use strata_stm::prelude::*;

#[test]
fn begin_write_commit() {
    let stm = Stm::new();
    let x = stm.new_cell(0i32);

    let id = ambient::begin(stm.manager(), false).unwrap();
    assert_eq!(ambient::current_id(), Some(id));
    ambient::with_current(|txn| x.put(txn, 3)).unwrap();
    assert_eq!(x.load(), 0);

    let info = ambient::commit().unwrap();
    assert_eq!(info.txn_id, id);
    assert!(!ambient::is_bound());
    assert_eq!(x.load(), 3);
}

#[test]
fn binding_is_per_thread() {
    let stm = Stm::new();
    ambient::begin(stm.manager(), true).unwrap();

    let other = thread::spawn(ambient::is_bound).join().unwrap();
    assert!(!other);
    assert!(ambient::is_bound());
    ambient::abort().unwrap();
}

#[test]
fn operations_without_a_binding_are_illegal() {
    assert!(matches!(
        ambient::commit(),
        Err(StmError::IllegalOperation { .. })
    ));
    assert!(ambient::with_current(|txn| Ok(txn.id())).is_err());
}

#[test]
fn suspend_here_resume_there() {
    let stm = Stm::new();
    let x = stm.new_cell(0i32);

    ambient::begin(stm.manager(), false).unwrap();
    ambient::with_current(|txn| x.put(txn, 7)).unwrap();
    let token = ambient::suspend(stm.manager()).unwrap();
    assert!(!ambient::is_bound());

    let (stm2, x2) = (stm.clone(), x.clone());
    thread::spawn(move || {
        let id = ambient::resume(stm2.manager(), token).unwrap();
        assert_eq!(id, token.txn_id());
        assert_eq!(ambient::with_current(|txn| x2.get(txn)).unwrap(), 7);
        ambient::commit().unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(x.load(), 7);
}

#[test]
fn explicit_transaction_can_be_bound() {
    let stm = Stm::new();
    let txn = stm.begin(false);
    let id = txn.id();
    ambient::bind(txn).unwrap();

    assert!(ambient::bind(stm.begin(false)).is_err());
    let txn = ambient::unbind().unwrap();
    assert_eq!(txn.id(), id);
    txn.abort();
}

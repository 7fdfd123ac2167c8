// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn now() -> DateTime<Utc> {
    Utc::now()
}

#[test]
fn lock_ids_ascend_from_one() {
    let mut reg = PartialLockRegistry::new();
    let a = reg
        .acquire(SessionId(1), now(), vec![NodeId(10)], vec!["/a".into()])
        .expect("acquire");
    let b = reg
        .acquire(SessionId(1), now(), vec![NodeId(11)], vec!["/b".into()])
        .expect("acquire");
    assert_eq!(a, LockId(1));
    assert_eq!(b, LockId(2));
}

#[test]
fn overlapping_sets_are_refused_with_holder() {
    let mut reg = PartialLockRegistry::new();
    reg.acquire(SessionId(1), now(), vec![NodeId(10), NodeId(11)], vec!["/a".into()])
        .expect("acquire");
    let err = reg
        .acquire(SessionId(2), now(), vec![NodeId(11)], vec!["/a/b".into()])
        .unwrap_err();
    assert_eq!(err, Status::LockDenied(1));
}

#[test]
fn disjoint_sets_coexist() {
    let mut reg = PartialLockRegistry::new();
    reg.acquire(SessionId(1), now(), vec![NodeId(10)], vec!["/a".into()]).expect("acquire");
    reg.acquire(SessionId(2), now(), vec![NodeId(20)], vec!["/b".into()]).expect("acquire");
    assert_eq!(reg.len(), 2);
    // pairwise disjoint invariant
    let sets: Vec<Vec<NodeId>> = reg.iter().map(|l| l.nodes.clone()).collect();
    assert!(sets[0].iter().all(|n| !sets[1].contains(n)));
}

#[test]
fn empty_selection_locks_nothing_but_is_releasable() {
    let mut reg = PartialLockRegistry::new();
    let id = reg
        .acquire(SessionId(1), now(), Vec::new(), vec!["/nothing/matches".into()])
        .expect("acquire");
    // no exclusion effect on others
    reg.acquire(SessionId(2), now(), vec![NodeId(1)], vec!["/a".into()]).expect("acquire");
    reg.release(SessionId(1), id).expect("release");
}

#[test]
fn only_the_owner_may_release() {
    let mut reg = PartialLockRegistry::new();
    let id = reg.acquire(SessionId(1), now(), vec![NodeId(5)], vec!["/a".into()]).expect("acquire");
    let err = reg.release(SessionId(2), id).unwrap_err();
    assert_eq!(err, Status::LockDenied(1));
    reg.release(SessionId(1), id).expect("owner release");
}

#[test]
fn unknown_lock_id_is_invalid_value() {
    let mut reg = PartialLockRegistry::new();
    assert!(matches!(
        reg.release(SessionId(1), LockId(99)),
        Err(Status::InvalidValue(_))
    ));
}

#[test]
fn session_teardown_drops_all_its_locks() {
    let mut reg = PartialLockRegistry::new();
    reg.acquire(SessionId(1), now(), vec![NodeId(1)], vec!["/a".into()]).expect("acquire");
    reg.acquire(SessionId(1), now(), vec![NodeId(2)], vec!["/b".into()]).expect("acquire");
    reg.acquire(SessionId(2), now(), vec![NodeId(3)], vec!["/c".into()]).expect("acquire");
    assert_eq!(reg.release_session(SessionId(1)), 2);
    assert_eq!(reg.len(), 1);
}

#[test]
fn blocked_for_ignores_own_locks() {
    let mut reg = PartialLockRegistry::new();
    reg.acquire(SessionId(1), now(), vec![NodeId(7)], vec!["/a".into()]).expect("acquire");
    assert!(reg.blocked_for(SessionId(1), NodeId(7)).is_none());
    assert!(reg.blocked_for(SessionId(2), NodeId(7)).is_some());
}

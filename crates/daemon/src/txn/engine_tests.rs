// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction engine tests driven against an in-memory server state.

use super::*;
use crate::instrument::Instrumentation;
use crate::profile::Profile;
use crate::server::ServerState;
use ncs_core::value::{EditMeta, ValueNode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn test_profile() -> (Profile, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let profile = Profile { state_dir: dir.path().to_path_buf(), ..Profile::default() };
    (profile, dir)
}

fn ready_state(profile: &Profile) -> ServerState {
    let mut state = ServerState::new(profile);
    state.running.set_ready();
    if let Some(c) = state.candidate.as_mut() {
        c.set_ready();
    }
    state
}

/// Edit fragment: `<system><hostname op>r1</hostname></system>`.
fn hostname_edit(state: &ServerState, value: &str, op: Option<EditOp>) -> ValueTree {
    let sys_ns = state.wk.sys;
    let system_sid = state.schema.top(sys_ns, "system").expect("system sid");
    let hostname_sid = state.schema.child(system_sid, sys_ns, "hostname").expect("sid");
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    let system = tree.add_child(
        root,
        ValueNode::new(sys_ns, "system", ValueKind::Container).with_schema(system_sid),
    );
    let mut leaf = ValueNode::new(sys_ns, "hostname", ValueKind::Leaf(value.into()))
        .with_schema(hostname_sid);
    if op.is_some() {
        leaf.edit = Some(EditMeta { op, insert: None });
    }
    tree.add_child(system, leaf);
    tree
}

/// Edit fragment adding a user entry; key omitted when `name` is None.
fn user_edit(state: &ServerState, name: Option<&str>) -> ValueTree {
    let sys_ns = state.wk.sys;
    let system_sid = state.schema.top(sys_ns, "system").expect("system sid");
    let user_sid = state.schema.child(system_sid, sys_ns, "user").expect("sid");
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    let system = tree.add_child(
        root,
        ValueNode::new(sys_ns, "system", ValueKind::Container).with_schema(system_sid),
    );
    let entry =
        tree.add_child(system, ValueNode::new(sys_ns, "user", ValueKind::List).with_schema(user_sid));
    if let Some(name) = name {
        let name_sid = state.schema.child(user_sid, sys_ns, "name").expect("sid");
        tree.add_child(
            entry,
            ValueNode::new(sys_ns, "name", ValueKind::Leaf(name.into())).with_schema(name_sid),
        );
    }
    tree
}

fn run_edit_on_running(
    state: &mut ServerState,
    profile: &Profile,
    edits: &ValueTree,
    errors: &mut RpcErrorList,
) -> TxnOutcome {
    let mut txn = Transaction::new(state, profile, SessionId(1), DatastoreName::Running);
    txn.run_edit(edits, None, ErrorOption::RollbackOnError, None, errors)
        .expect("transaction drivable")
}

#[test]
fn merge_creates_subtree_and_bumps_txid() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let mut errors = RpcErrorList::new();

    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    match outcome {
        TxnOutcome::Committed(audit) => {
            assert_eq!(audit.len(), 1);
            assert!(audit[0].target.contains("system"));
        }
        other => panic!("expected commit, got {other:?}"),
    }
    assert!(errors.is_empty());
    assert_eq!(state.tx_counter, TxId(1));

    let sys_ns = state.wk.sys;
    let root = state.running.root();
    let system = state.running.tree().find_child(root, sys_ns, "system").expect("system");
    assert_eq!(state.running.tree().child_leaf_value(system, "hostname"), Some("r1"));
    // the running snapshot was persisted
    assert!(profile.startup_file().exists());
}

#[test]
fn merge_of_present_value_is_noop_without_txid_bump() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let mut errors = RpcErrorList::new();
    run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert_eq!(state.tx_counter, TxId(1));

    let again = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let outcome = run_edit_on_running(&mut state, &profile, &again, &mut errors);
    assert!(matches!(outcome, TxnOutcome::NoOp));
    assert_eq!(state.tx_counter, TxId(1));
}

#[test]
fn create_on_existing_node_is_data_exists() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let mut errors = RpcErrorList::new();
    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    run_edit_on_running(&mut state, &profile, &edits, &mut errors);

    let dup = hostname_edit(&state, "r2", Some(EditOp::Create));
    let outcome = run_edit_on_running(&mut state, &profile, &dup, &mut errors);
    assert!(matches!(outcome, TxnOutcome::Failed));
    assert_eq!(errors.iter().next().map(|e| e.error_tag), Some(ncs_core::rpcerr::ErrorTag::DataExists));
    // value unchanged
    let sys_ns = state.wk.sys;
    let root = state.running.root();
    let system = state.running.tree().find_child(root, sys_ns, "system").expect("system");
    assert_eq!(state.running.tree().child_leaf_value(system, "hostname"), Some("r1"));
}

#[test]
fn delete_of_missing_node_is_data_missing() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let mut errors = RpcErrorList::new();
    let edits = hostname_edit(&state, "r1", Some(EditOp::Delete));
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert!(matches!(outcome, TxnOutcome::Failed));
    assert!(errors.iter().any(|e| e.error_tag == ncs_core::rpcerr::ErrorTag::DataMissing));
}

#[test]
fn remove_of_missing_node_is_silent() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let mut errors = RpcErrorList::new();
    let edits = hostname_edit(&state, "r1", Some(EditOp::Remove));
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert!(matches!(outcome, TxnOutcome::NoOp));
    assert!(errors.is_empty());
}

#[test]
fn missing_list_key_fails_validation_and_target_is_unchanged() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let mut errors = RpcErrorList::new();
    let edits = user_edit(&state, None);
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert!(matches!(outcome, TxnOutcome::Failed));
    assert!(errors
        .iter()
        .any(|e| e.error_tag == ncs_core::rpcerr::ErrorTag::MissingElement));
    assert!(errors.iter().any(|e| e.path.as_deref().is_some_and(|p| p.contains("user"))));
    // nothing was committed
    let sys_ns = state.wk.sys;
    let root = state.running.root();
    assert!(state.running.tree().find_child(root, sys_ns, "system").is_none());
    assert_eq!(state.tx_counter, TxId(0));
}

#[test]
fn partial_lock_blocks_other_sessions_writes() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let mut errors = RpcErrorList::new();
    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    run_edit_on_running(&mut state, &profile, &edits, &mut errors);

    // session 2 locks /system
    let sys_ns = state.wk.sys;
    let root = state.running.root();
    let system = state.running.tree().find_child(root, sys_ns, "system").expect("system");
    state
        .plocks
        .acquire(SessionId(2), Utc::now(), vec![system], vec!["/system".into()])
        .expect("plock");

    let mut errors = RpcErrorList::new();
    let edits = hostname_edit(&state, "r2", Some(EditOp::Merge));
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert!(matches!(outcome, TxnOutcome::Failed));
    assert!(errors.iter().any(|e| e.error_tag == ncs_core::rpcerr::ErrorTag::LockDenied));
}

struct DeferringHook {
    applies: AtomicUsize,
}

impl Instrumentation for DeferringHook {
    fn apply(&self, _ctx: &crate::instrument::HookContext<'_>) -> Result<Outcome, Status> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Deferred)
    }
}

#[test]
fn deferred_apply_parks_then_completion_commits() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let hook = Arc::new(DeferringHook { applies: AtomicUsize::new(0) });
    let sys_ns = state.wk.sys;
    state.instruments.register(sys_ns, "system", hook.clone());

    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let mut errors = RpcErrorList::new();
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    let txid = match outcome {
        TxnOutcome::Parked(txid) => txid,
        other => panic!("expected parked, got {other:?}"),
    };
    assert_eq!(hook.applies.load(Ordering::SeqCst), 1);
    assert_eq!(state.parked.len(), 1);
    // nothing committed yet
    assert_eq!(state.tx_counter, TxId(0));
    let root = state.running.root();
    assert!(state.running.tree().find_child(root, sys_ns, "system").is_none());

    // completion record resumes and commits
    let (parked, result) =
        complete_parked(&mut state, &profile, txid, Ok(())).expect("parked txn");
    assert_eq!(parked.txid, txid);
    assert!(result.is_ok());
    assert_eq!(state.tx_counter, txid);
    let root = state.running.root();
    assert!(state.running.tree().find_child(root, sys_ns, "system").is_some());
    assert!(state.parked.is_empty());
}

#[test]
fn parked_transaction_excludes_new_edits_on_same_target() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    let hook = Arc::new(DeferringHook { applies: AtomicUsize::new(0) });
    let sys_ns = state.wk.sys;
    state.instruments.register(sys_ns, "system", hook);

    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let mut errors = RpcErrorList::new();
    let outcome = run_edit_on_running(&mut state, &profile, &edits, &mut errors);
    assert!(matches!(outcome, TxnOutcome::Parked(_)));

    let mut errors = RpcErrorList::new();
    let edits2 = hostname_edit(&state, "r2", Some(EditOp::Merge));
    let mut txn = Transaction::new(&mut state, &profile, SessionId(3), DatastoreName::Running);
    let err = txn
        .run_edit(&edits2, None, ErrorOption::RollbackOnError, None, &mut errors)
        .unwrap_err();
    assert_eq!(err, Status::InUse);
}

#[test]
fn global_lock_by_other_session_is_in_use_with_holder() {
    let (profile, _dir) = test_profile();
    let mut state = ready_state(&profile);
    state.running.lock(SessionId(9)).expect("lock");
    let edits = hostname_edit(&state, "r1", Some(EditOp::Merge));
    let mut errors = RpcErrorList::new();
    let mut txn = Transaction::new(&mut state, &profile, SessionId(1), DatastoreName::Running);
    let err = txn
        .run_edit(&edits, None, ErrorOption::RollbackOnError, None, &mut errors)
        .unwrap_err();
    assert_eq!(err, Status::InUse);
    assert!(errors
        .iter()
        .any(|e| e.info.iter().any(|i| matches!(i, ErrorInfo::SessionId(9)))));
}

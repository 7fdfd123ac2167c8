// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC transaction engine.
//!
//! An editing RPC runs in phases: parse (done by the operation handler)
//! → validate → root-check → apply (instrumentation) → commit, with
//! rollback on failure subject to the error-option. Edits are applied
//! to a staged clone of the target tree; commit atomically swaps the
//! clone in, bumps the transaction id and persists it. A staged clone
//! keeps node handles stable, so partial-lock node sets remain valid.

pub mod confirm;

use chrono::{DateTime, Utc};
use ncs_core::error::Status;
use ncs_core::id::{MsgId, SessionId, TxId};
use ncs_core::rpcerr::{ErrorInfo, RpcError, RpcErrorList};
use ncs_core::schema::SchemaKind;
use ncs_core::value::{EditOp, InsertPoint, NodeId, ValueKind, ValueTree};
use ncs_core::xmlns::NsId;
use ncs_store::check::{self, CheckError};
use ncs_store::DatastoreName;
use tracing::{debug, info, warn};

use crate::instrument::{HookContext, Outcome, Phase};
use crate::notif::{AuditEdit, EventKind, Notification};
use crate::profile::Profile;
use crate::server::ServerState;

/// `error-option` from `<edit-config>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOption {
    RollbackOnError,
    ContinueOnError,
    StopOnError,
}

impl ErrorOption {
    pub fn parse(s: &str) -> Option<ErrorOption> {
        match s {
            "rollback-on-error" => Some(ErrorOption::RollbackOnError),
            "continue-on-error" => Some(ErrorOption::ContinueOnError),
            "stop-on-error" => Some(ErrorOption::StopOnError),
            _ => None,
        }
    }
}

/// Transaction phases, in driving order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Parse,
    Validate,
    RootCheck,
    Apply,
    Commit,
    Rollback,
}

/// A transaction whose apply phase deferred; resumed by a completion
/// record posted to the engine.
pub struct ParkedTransaction {
    pub txid: TxId,
    pub sid: SessionId,
    pub message_id: Option<MsgId>,
    pub target: DatastoreName,
    pub staged: ValueTree,
    pub audit: Vec<AuditEdit>,
}

impl std::fmt::Debug for ParkedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkedTransaction")
            .field("txid", &self.txid)
            .field("sid", &self.sid)
            .field("target", &self.target)
            .finish()
    }
}

/// Outcome of driving one transaction.
#[derive(Debug)]
pub enum TxnOutcome {
    /// Committed; audit trail of what changed (empty = no-op).
    Committed(Vec<AuditEdit>),
    /// Nothing changed; no transaction id was consumed.
    NoOp,
    /// Apply deferred; the transaction is parked and no reply may be
    /// sent yet.
    Parked(TxId),
    /// Validation or apply failed; errors are in the caller's list.
    Failed,
}

/// One staged edit transaction.
pub struct Transaction<'a> {
    pub state: &'a mut ServerState,
    pub profile: &'a Profile,
    pub sid: SessionId,
    pub target: DatastoreName,
    pub phase: TxPhase,
    pub started_at: DateTime<Utc>,
}

impl<'a> Transaction<'a> {
    pub fn new(
        state: &'a mut ServerState,
        profile: &'a Profile,
        sid: SessionId,
        target: DatastoreName,
    ) -> Self {
        Self { state, profile, sid, target, phase: TxPhase::Parse, started_at: Utc::now() }
    }

    /// Refuse when another transaction is active on the target.
    fn check_exclusive(&self) -> Result<(), Status> {
        if self.state.parked.iter().any(|p| p.target == self.target) {
            return Err(Status::InUse);
        }
        Ok(())
    }

    /// Refuse when another session holds the target's global lock.
    fn check_global_lock(&self, errors: &mut RpcErrorList) -> Result<(), Status> {
        let Some(ds) = self.state.datastore(self.target) else {
            return Err(Status::InvalidValue(format!("no {} datastore", self.target)));
        };
        if !ds.is_ready() {
            return Err(Status::ResourceDenied(format!("{} not ready", self.target)));
        }
        if let Some(holder) = ds.lock_holder() {
            if holder != self.sid {
                let status = Status::InUse;
                errors.push(
                    RpcError::from_status(&status).with_info(ErrorInfo::SessionId(holder.0)),
                );
                return Err(status);
            }
        }
        Ok(())
    }

    /// Drive an `<edit-config>` payload through all phases.
    ///
    /// `edits` is the parsed `<config>` fragment: a tree whose root's
    /// children carry [`ncs_core::value::EditMeta`] annotations.
    pub fn run_edit(
        &mut self,
        edits: &ValueTree,
        default_op: Option<EditOp>,
        error_opt: ErrorOption,
        message_id: Option<MsgId>,
        errors: &mut RpcErrorList,
    ) -> Result<TxnOutcome, Status> {
        self.check_exclusive()?;
        self.check_global_lock(errors)?;

        let Some(edit_root) = edits.root() else {
            return Ok(TxnOutcome::NoOp);
        };

        let ds = match self.state.datastore(self.target) {
            Some(ds) => ds,
            None => return Err(Status::InvalidValue(format!("no {} datastore", self.target))),
        };
        let mut staged = ds.tree().clone();
        let staged_root = ds.root();

        // apply edits in peer order onto the staged clone
        self.phase = TxPhase::Validate;
        let mut audit: Vec<AuditEdit> = Vec::new();
        let mut edit_errors = RpcErrorList::new();
        let mut stopped = false;
        for edit_child in edits.children(edit_root).to_vec() {
            if stopped {
                break;
            }
            let result = self.apply_node(
                &mut staged,
                staged_root,
                edits,
                edit_child,
                default_op.unwrap_or(EditOp::Merge),
                &mut audit,
            );
            if let Err(status) = result {
                edit_errors.push(
                    RpcError::from_status(&status)
                        .with_path(check::path_of(edits, &self.state.schema, edit_child)),
                );
                match error_opt {
                    ErrorOption::RollbackOnError => {
                        for e in edit_errors.into_vec() {
                            errors.push(e);
                        }
                        debug!(session = %self.sid, "edit rolled back");
                        return Ok(TxnOutcome::Failed);
                    }
                    ErrorOption::StopOnError => stopped = true,
                    ErrorOption::ContinueOnError => {}
                }
            }
        }

        // validate + root-check the staged result
        self.phase = TxPhase::RootCheck;
        let check_errors = check::root_check(&staged, staged_root, &self.state.schema);
        if !check_errors.is_empty() {
            push_check_errors(errors, &check_errors);
            for e in edit_errors.into_vec() {
                errors.push(e);
            }
            return Ok(TxnOutcome::Failed);
        }
        for e in edit_errors.iter() {
            errors.push(e.clone());
        }

        if audit.is_empty() {
            // merge of already-present values: observable no-op
            return Ok(TxnOutcome::NoOp);
        }

        self.finish(staged, audit, message_id)
    }

    /// Replace the whole target tree (copy-config source already deep
    /// copied into `staged`).
    pub fn run_replace(
        &mut self,
        staged: ValueTree,
        message_id: Option<MsgId>,
        errors: &mut RpcErrorList,
    ) -> Result<TxnOutcome, Status> {
        let audit = vec![AuditEdit { target: "/".to_string(), operation: EditOp::Replace }];
        self.run_replace_with_audit(staged, audit, message_id, errors)
    }

    /// Whole-tree replacement with a caller-computed audit trail
    /// (`<commit>` promoting candidate to running).
    pub fn run_replace_with_audit(
        &mut self,
        staged: ValueTree,
        audit: Vec<AuditEdit>,
        message_id: Option<MsgId>,
        errors: &mut RpcErrorList,
    ) -> Result<TxnOutcome, Status> {
        self.check_exclusive()?;
        self.check_global_lock(errors)?;
        let root = match staged.root() {
            Some(r) => r,
            None => return Err(Status::Internal("staged tree has no root".into())),
        };
        let check_errors = check::root_check(&staged, root, &self.state.schema);
        if !check_errors.is_empty() {
            push_check_errors(errors, &check_errors);
            return Ok(TxnOutcome::Failed);
        }
        self.finish(staged, audit, message_id)
    }

    /// Apply/commit phases over the staged tree. Parks when an
    /// instrumentation callback defers.
    fn finish(
        &mut self,
        staged: ValueTree,
        audit: Vec<AuditEdit>,
        message_id: Option<MsgId>,
    ) -> Result<TxnOutcome, Status> {
        let txid = self.state.peek_next_txid();

        // instrumentation: validate then apply, per affected subtree
        self.phase = TxPhase::Apply;
        let mut deferred = false;
        for phase in [Phase::Validate, Phase::Apply] {
            let outcome = self.drive_hooks(&staged, txid, phase)?;
            if outcome == Outcome::Deferred {
                deferred = true;
            }
        }
        if deferred {
            info!(session = %self.sid, tx = %txid, "transaction parked on deferred apply");
            self.state.parked.push(ParkedTransaction {
                txid,
                sid: self.sid,
                message_id,
                target: self.target,
                staged,
                audit,
            });
            return Ok(TxnOutcome::Parked(txid));
        }

        self.phase = TxPhase::Commit;
        commit_staged(self.state, self.profile, self.sid, self.target, staged, audit.clone(), txid)?;
        Ok(TxnOutcome::Committed(audit))
    }

    fn drive_hooks(
        &mut self,
        staged: &ValueTree,
        txid: TxId,
        phase: Phase,
    ) -> Result<Outcome, Status> {
        let root = match staged.root() {
            Some(r) => r,
            None => return Ok(Outcome::Ok),
        };
        let mut result = Outcome::Ok;
        for top in staged.children(root).to_vec() {
            let Some(node) = staged.node(top) else { continue };
            let Some(hook) = self.state.instruments.lookup(node.ns, &node.name) else {
                continue;
            };
            let ctx = HookContext { txid, staged, node: Some(top) };
            let outcome = match phase {
                Phase::Validate => hook.validate(&ctx),
                Phase::Apply => hook.apply(&ctx),
                Phase::Commit => hook.commit(&ctx),
                Phase::Rollback => hook.rollback(&ctx),
            };
            match outcome {
                Ok(Outcome::Ok) => {}
                Ok(Outcome::Deferred) => result = Outcome::Deferred,
                Err(status) => {
                    // rollback already-applied hooks in reverse order
                    if phase == Phase::Apply {
                        self.phase = TxPhase::Rollback;
                        self.rollback_hooks(staged, txid, top);
                    }
                    return Err(status);
                }
            }
        }
        Ok(result)
    }

    /// Invoke rollback on every hook up to (excluding) the failed one,
    /// in reverse apply order.
    fn rollback_hooks(&mut self, staged: &ValueTree, txid: TxId, failed: NodeId) {
        let Some(root) = staged.root() else { return };
        let applied: Vec<NodeId> = staged
            .children(root)
            .iter()
            .copied()
            .take_while(|n| *n != failed)
            .collect();
        for top in applied.into_iter().rev() {
            let Some(node) = staged.node(top) else { continue };
            if let Some(hook) = self.state.instruments.lookup(node.ns, &node.name) {
                let ctx = HookContext { txid, staged, node: Some(top) };
                if hook.rollback(&ctx).is_err() {
                    warn!(tx = %txid, "instrumentation rollback failed");
                }
            }
        }
    }

    // ---- edit application ----

    /// Apply one edit node onto the staged tree under `staged_parent`.
    fn apply_node(
        &mut self,
        staged: &mut ValueTree,
        staged_parent: NodeId,
        edits: &ValueTree,
        edit_node: NodeId,
        inherited_op: EditOp,
        audit: &mut Vec<AuditEdit>,
    ) -> Result<(), Status> {
        let Some(enode) = edits.node(edit_node) else {
            return Err(Status::Internal("edit node vanished".into()));
        };
        let op = enode.edit.as_ref().and_then(|m| m.op).unwrap_or(inherited_op);
        let insert = enode.edit.as_ref().and_then(|m| m.insert.clone());

        // locate the corresponding target node
        let target = self.find_target(staged, staged_parent, edits, edit_node);

        // partial-lock exclusion: an existing node (or the parent for a
        // create) must not sit inside another session's lock set
        let guard_node = target.unwrap_or(staged_parent);
        if let Some(lock) = blocking_lock(self.state, staged, guard_node, self.sid) {
            return Err(Status::LockDenied(lock));
        }

        match op {
            EditOp::Delete => {
                let Some(t) = target else {
                    return Err(Status::DataMissing);
                };
                let path = check::path_of(staged, &self.state.schema, t);
                staged.free_subtree(t);
                audit.push(AuditEdit { target: path, operation: EditOp::Delete });
                Ok(())
            }
            EditOp::Remove => {
                if let Some(t) = target {
                    let path = check::path_of(staged, &self.state.schema, t);
                    staged.free_subtree(t);
                    audit.push(AuditEdit { target: path, operation: EditOp::Remove });
                }
                Ok(())
            }
            EditOp::Create => {
                if target.is_some() {
                    return Err(Status::DataExists);
                }
                let new_id =
                    self.copy_edit_subtree(staged, staged_parent, edits, edit_node, insert);
                if let Some(new_id) = new_id {
                    let path = check::path_of(staged, &self.state.schema, new_id);
                    audit.push(AuditEdit { target: path, operation: EditOp::Create });
                }
                Ok(())
            }
            EditOp::Replace => {
                if let Some(t) = target {
                    staged.free_subtree(t);
                }
                let new_id =
                    self.copy_edit_subtree(staged, staged_parent, edits, edit_node, insert);
                if let Some(new_id) = new_id {
                    let path = check::path_of(staged, &self.state.schema, new_id);
                    audit.push(AuditEdit { target: path, operation: EditOp::Replace });
                }
                Ok(())
            }
            EditOp::Merge => self.merge_node(staged, staged_parent, edits, edit_node, target, insert, audit),
        }
    }

    /// Merge semantics: leaves overwrite when different, containers and
    /// list entries are created when missing and recursed otherwise.
    #[allow(clippy::too_many_arguments)]
    fn merge_node(
        &mut self,
        staged: &mut ValueTree,
        staged_parent: NodeId,
        edits: &ValueTree,
        edit_node: NodeId,
        target: Option<NodeId>,
        insert: Option<InsertPoint>,
        audit: &mut Vec<AuditEdit>,
    ) -> Result<(), Status> {
        let Some(enode) = edits.node(edit_node) else {
            return Err(Status::Internal("edit node vanished".into()));
        };
        match (&enode.kind, target) {
            (ValueKind::Leaf(new_value), Some(t)) => {
                let unchanged = staged
                    .node(t)
                    .and_then(|n| n.leaf_value())
                    .is_some_and(|v| v == new_value);
                if !unchanged {
                    let path = check::path_of(staged, &self.state.schema, t);
                    if let Some(n) = staged.node_mut(t) {
                        n.kind = ValueKind::Leaf(new_value.clone());
                        n.from_default = false;
                    }
                    audit.push(AuditEdit { target: path, operation: EditOp::Merge });
                }
                Ok(())
            }
            (ValueKind::Empty, Some(_)) | (ValueKind::LeafList(_), Some(_)) => {
                // already present: no-op
                Ok(())
            }
            (ValueKind::Leaf(_), None)
            | (ValueKind::LeafList(_), None)
            | (ValueKind::Empty, None)
            | (ValueKind::AnyXml(_), None) => {
                let new_id =
                    self.copy_edit_subtree(staged, staged_parent, edits, edit_node, insert);
                if let Some(new_id) = new_id {
                    let path = check::path_of(staged, &self.state.schema, new_id);
                    audit.push(AuditEdit { target: path, operation: EditOp::Merge });
                }
                Ok(())
            }
            (_, None) => {
                // missing container or list entry: create a shell and
                // process the children individually so nested delete /
                // remove / create annotations keep their semantics
                let mut shell = enode.clone();
                shell.children = Vec::new();
                shell.edit = None;
                let index = insert_index(staged, staged_parent, &shell.ns, &shell.name, &insert);
                let new_id = match index {
                    Some(index) => staged.insert_child_at(staged_parent, index, shell),
                    None => staged.add_child(staged_parent, shell),
                };
                let mut sub_audit = Vec::new();
                for child in edits.children(edit_node).to_vec() {
                    self.apply_node(staged, new_id, edits, child, EditOp::Merge, &mut sub_audit)?;
                }
                let is_np_container = enode
                    .schema
                    .and_then(|sid| self.state.schema.node(sid))
                    .is_some_and(|t| matches!(t.kind, SchemaKind::Container { presence: false }));
                if staged.children(new_id).is_empty() && is_np_container {
                    // nothing materialized under a non-presence shell
                    staged.free_subtree(new_id);
                } else {
                    // one audit record for the topmost created node
                    let path = check::path_of(staged, &self.state.schema, new_id);
                    audit.push(AuditEdit { target: path, operation: EditOp::Merge });
                }
                Ok(())
            }
            (_, Some(t)) => {
                // container / list entry exists: recurse children
                for child in edits.children(edit_node).to_vec() {
                    self.apply_node(staged, t, edits, child, EditOp::Merge, audit)?;
                }
                Ok(())
            }
        }
    }

    /// Find the staged-tree node an edit node corresponds to.
    fn find_target(
        &self,
        staged: &ValueTree,
        staged_parent: NodeId,
        edits: &ValueTree,
        edit_node: NodeId,
    ) -> Option<NodeId> {
        let enode = edits.node(edit_node)?;
        let schema = &self.state.schema;
        let is_list = enode
            .schema
            .and_then(|sid| schema.node(sid))
            .map(|t| matches!(t.kind, SchemaKind::List { .. }))
            .unwrap_or(false);
        if is_list {
            let keys: Vec<(String, String)> = enode
                .schema
                .and_then(|sid| schema.node(sid))
                .map(|t| t.list_keys().to_vec())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|k| {
                    edits.child_leaf_value(edit_node, &k).map(|v| (k, v.to_string()))
                })
                .collect();
            if keys.is_empty() {
                return None;
            }
            return staged.find_list_entry(staged_parent, enode.ns, &enode.name, &keys);
        }
        if matches!(enode.kind, ValueKind::LeafList(_)) {
            let want = enode.leaf_value()?;
            return staged
                .find_children(staged_parent, enode.ns, &enode.name)
                .into_iter()
                .find(|c| staged.node(*c).and_then(|n| n.leaf_value()) == Some(want));
        }
        staged.find_child(staged_parent, enode.ns, &enode.name)
    }

    /// Deep-copy an edit subtree into the staged tree, honoring the
    /// `insert` attribute for user-ordered lists and leaf-lists.
    fn copy_edit_subtree(
        &self,
        staged: &mut ValueTree,
        staged_parent: NodeId,
        edits: &ValueTree,
        edit_node: NodeId,
        insert: Option<InsertPoint>,
    ) -> Option<NodeId> {
        let enode = edits.node(edit_node)?;
        let index = insert_index(staged, staged_parent, &enode.ns, &enode.name, &insert);

        let new_id = match index {
            Some(index) => {
                let mut copy = enode.clone();
                copy.children = Vec::new();
                copy.edit = None;
                let id = staged.insert_child_at(staged_parent, index, copy);
                for child in edits.children(edit_node).to_vec() {
                    copy_stripped(staged, edits, child, id);
                }
                id
            }
            None => {
                let id = staged.copy_subtree_from(edits, edit_node, Some(staged_parent))?;
                strip_edit_meta(staged, id);
                id
            }
        };
        Some(new_id)
    }
}

/// Child index at which an `insert`-annotated node lands, or `None`
/// for append (insert=last and plain edits).
fn insert_index(
    staged: &ValueTree,
    parent: NodeId,
    ns: &NsId,
    name: &str,
    insert: &Option<InsertPoint>,
) -> Option<usize> {
    let siblings = staged.find_children(parent, *ns, name);
    match insert {
        Some(InsertPoint::First) => siblings
            .first()
            .and_then(|first| staged.children(parent).iter().position(|c| c == first)),
        Some(InsertPoint::Before(key)) => position_of(staged, &siblings, key)
            .and_then(|sib| staged.children(parent).iter().position(|c| *c == sib)),
        Some(InsertPoint::After(key)) => position_of(staged, &siblings, key)
            .and_then(|sib| staged.children(parent).iter().position(|c| *c == sib))
            .map(|i| i + 1),
        Some(InsertPoint::Last) | None => None,
    }
}

/// Key (for lists) or value (for leaf-lists) match among siblings.
fn position_of(staged: &ValueTree, siblings: &[NodeId], key: &str) -> Option<NodeId> {
    siblings.iter().copied().find(|s| {
        let node = staged.node(*s);
        let leaf = node.and_then(|n| n.leaf_value());
        if leaf == Some(key) {
            return true;
        }
        // list entry: match the first key leaf's value
        staged
            .children(*s)
            .first()
            .and_then(|c| staged.node(*c))
            .and_then(|n| n.leaf_value())
            .is_some_and(|v| v == key)
    })
}

fn copy_stripped(staged: &mut ValueTree, src: &ValueTree, src_id: NodeId, parent: NodeId) {
    if let Some(id) = staged.copy_subtree_from(src, src_id, Some(parent)) {
        strip_edit_meta(staged, id);
    }
}

fn strip_edit_meta(tree: &mut ValueTree, id: NodeId) {
    if let Some(n) = tree.node_mut(id) {
        n.edit = None;
    }
    for child in tree.children(id).to_vec() {
        strip_edit_meta(tree, child);
    }
}

/// Is `node` (or an ancestor) inside another session's partial lock?
/// Returns the holder's session id.
fn blocking_lock(
    state: &ServerState,
    staged: &ValueTree,
    node: NodeId,
    sid: SessionId,
) -> Option<u32> {
    let mut cur = Some(node);
    while let Some(c) = cur {
        if let Some(lock) = state.plocks.blocked_for(sid, c) {
            return Some(lock.sid.0);
        }
        cur = staged.node(c).and_then(|n| n.parent);
    }
    None
}

fn push_check_errors(errors: &mut RpcErrorList, check_errors: &[CheckError]) {
    for ce in check_errors {
        let mut err = RpcError::from_status(&ce.status).with_path(ce.path.clone());
        if let Status::MissingElement(name) = &ce.status {
            err = err.with_info(ErrorInfo::BadElement(name.clone()));
        }
        if let Status::NotUnique = &ce.status {
            err = err.with_info(ErrorInfo::NonUnique(ce.path.clone()));
        }
        errors.push(err);
    }
}

/// Commit a staged tree into its datastore: swap, bump + persist the
/// transaction id, save the running snapshot, publish sysConfigChange,
/// and invalidate the access-control caches when NACM data changed.
pub fn commit_staged(
    state: &mut ServerState,
    profile: &Profile,
    sid: SessionId,
    target: DatastoreName,
    staged: ValueTree,
    audit: Vec<AuditEdit>,
    txid: TxId,
) -> Result<(), Status> {
    let nacm_prefix = "/nacm";
    let touches_nacm = audit.iter().any(|e| e.target.starts_with(nacm_prefix));

    {
        let Some(ds) = state.datastore_mut(target) else {
            return Err(Status::InvalidValue(format!("no {target} datastore")));
        };
        ds.restore(staged);
    }

    if target == DatastoreName::Running {
        state.tx_counter = txid;
        if let Some(txid_file) = &state.txid_file {
            txid_file
                .store(txid)
                .map_err(|e| Status::OperationFailed(format!("persist txid: {e}")))?;
        }
        let snapshot_path = profile.startup_file();
        let reg = &state.ns;
        if let Err(e) = state.running.save_to_file(&snapshot_path, reg) {
            warn!(error = %e, "running snapshot save failed");
        }
        let user = state
            .sessions
            .get(sid)
            .map(|s| s.username().to_string())
            .unwrap_or_else(|| "server".to_string());
        state.publish(
            profile,
            Notification {
                time: Utc::now(),
                kind: EventKind::ConfigChange { sid, user, txid, edits: audit.clone() },
            },
        );
        info!(session = %sid, tx = %txid, edits = audit.len(), "transaction committed");
    } else {
        info!(session = %sid, target = %target, edits = audit.len(), "staged edits committed");
    }

    if touches_nacm {
        state.acm.invalidate_all();
    }
    Ok(())
}

/// Post a completion record for a parked transaction. Ok finishes the
/// commit and returns the parked context so the dispatcher can reply;
/// Err drives rollback hooks.
pub fn complete_parked(
    state: &mut ServerState,
    profile: &Profile,
    txid: TxId,
    result: Result<(), Status>,
) -> Option<(ParkedTransaction, Result<(), Status>)> {
    let idx = state.parked.iter().position(|p| p.txid == txid)?;
    let parked = state.parked.remove(idx);
    match result {
        Ok(()) => {
            let staged = parked.staged.clone();
            let commit = commit_staged(
                state,
                profile,
                parked.sid,
                parked.target,
                staged,
                parked.audit.clone(),
                txid,
            );
            Some((parked, commit))
        }
        Err(status) => {
            debug!(tx = %txid, "deferred apply failed, transaction dropped");
            Some((parked, Err(status)))
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

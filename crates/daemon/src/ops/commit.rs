// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<commit>`, `<cancel-commit>`, `<discard-changes>` and `<validate>`.

use chrono::Utc;
use ncs_core::error::Status;
use ncs_core::rpcerr::RpcError;
use ncs_core::value::EditOp;
use ncs_store::{check, DatastoreName};

use crate::notif::{AuditEdit, CommitEvent, EventKind, Notification};
use crate::ops::{
    next_param, parse_config_fragment, read_text, skip_param, RpcContext, RpcOutput,
};
use crate::server::ServerState;
use crate::txn::confirm::ConfirmState;
use crate::txn::{Transaction, TxnOutcome};

/// Default confirm-timeout (seconds) when `<confirmed/>` is present
/// without an explicit value.
const DEFAULT_CONFIRM_TIMEOUT: u32 = 600;

pub fn commit(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let mut confirmed = false;
    let mut timeout = DEFAULT_CONFIRM_TIMEOUT;
    let mut persist = None;
    let mut persist_id = None;
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "confirmed" => {
                    confirmed = true;
                    skip_param(ctx.reader, p.empty)?;
                }
                "confirm-timeout" => {
                    let text = read_text(ctx.reader)?;
                    timeout = text.parse::<u32>().map_err(|_| Status::InvalidValue(text))?;
                }
                "persist" => persist = Some(read_text(ctx.reader)?),
                "persist-id" => persist_id = Some(read_text(ctx.reader)?),
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }

    if ctx.state.candidate.is_none() {
        return Err(Status::OperationNotSupported("commit without candidate".to_string()));
    }

    let sid = ctx.sid;
    let user = ctx.username();

    // a pending confirmed commit completes (or re-arms) first
    if let Some(pending) = ctx.state.confirm.take() {
        if !pending.may_complete(sid, persist_id.as_deref()) {
            ctx.state.confirm = Some(pending);
            return Err(Status::AccessDenied);
        }
        if confirmed {
            // follow-up confirmed commit: extend the window
            let mut pending = pending;
            pending.extend(Utc::now(), timeout);
            apply_candidate(ctx, sid)?;
            ctx.state.confirm = Some(pending);
            publish_confirm_event(ctx.state, ctx.profile, sid, &user, CommitEvent::Extend);
            return Ok(RpcOutput::Ok);
        }
        apply_candidate(ctx, sid)?;
        publish_confirm_event(ctx.state, ctx.profile, sid, &user, CommitEvent::Complete);
        return Ok(RpcOutput::Ok);
    }

    if confirmed {
        let snapshot = ctx.state.running.snapshot();
        apply_candidate(ctx, sid)?;
        ctx.state.confirm = Some(ConfirmState::new(
            sid,
            persist.or(persist_id),
            snapshot,
            Utc::now(),
            timeout,
        ));
        publish_confirm_event(ctx.state, ctx.profile, sid, &user, CommitEvent::Start);
        return Ok(RpcOutput::Ok);
    }

    apply_candidate(ctx, sid)?;
    Ok(RpcOutput::Ok)
}

/// Copy the candidate tree over running as one transaction.
fn apply_candidate(ctx: &mut RpcContext<'_>, sid: ncs_core::id::SessionId) -> Result<(), Status> {
    let audit = candidate_audit(ctx.state);
    if audit.is_empty() {
        return Ok(());
    }
    let staged = match ctx.state.candidate.as_ref() {
        Some(c) => c.tree().clone(),
        None => return Err(Status::OperationNotSupported("no candidate".to_string())),
    };
    let mut txn = Transaction::new(ctx.state, ctx.profile, sid, DatastoreName::Running);
    let message_id = ctx.message_id.clone();
    match txn.run_replace_with_audit(staged, audit, message_id, &mut ctx.errors)? {
        TxnOutcome::Committed(_) | TxnOutcome::NoOp => Ok(()),
        TxnOutcome::Parked(_) => Err(Status::OperationFailed("commit deferred".to_string())),
        TxnOutcome::Failed => Err(Status::OperationFailed("commit".to_string())),
    }
}

/// Shallow diff of candidate vs running: one audit record per changed
/// top-level subtree.
fn candidate_audit(state: &ServerState) -> Vec<AuditEdit> {
    let Some(candidate) = state.candidate.as_ref() else { return Vec::new() };
    let mut audit = Vec::new();
    let ctree = candidate.tree();
    let croot = candidate.root();
    let rtree = state.running.tree();
    let rroot = state.running.root();

    for child in ctree.children(croot) {
        let Some(cnode) = ctree.node(*child) else { continue };
        match rtree.find_child(rroot, cnode.ns, &cnode.name) {
            None => audit.push(AuditEdit {
                target: format!("/{}", cnode.name),
                operation: EditOp::Create,
            }),
            Some(existing) => {
                if !ctree.subtree_equal(*child, rtree, existing) {
                    audit.push(AuditEdit {
                        target: format!("/{}", cnode.name),
                        operation: EditOp::Merge,
                    });
                }
            }
        }
    }
    for child in rtree.children(rroot) {
        let Some(rnode) = rtree.node(*child) else { continue };
        if ctree.find_child(croot, rnode.ns, &rnode.name).is_none() {
            audit.push(AuditEdit {
                target: format!("/{}", rnode.name),
                operation: EditOp::Delete,
            });
        }
    }
    audit
}

fn publish_confirm_event(
    state: &mut ServerState,
    profile: &crate::profile::Profile,
    sid: ncs_core::id::SessionId,
    user: &str,
    event: CommitEvent,
) {
    state.publish(
        profile,
        Notification {
            time: Utc::now(),
            kind: EventKind::ConfirmedCommit { sid, user: user.to_string(), event },
        },
    );
}

pub fn cancel_commit(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let mut persist_id = None;
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "persist-id" => persist_id = Some(read_text(ctx.reader)?),
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }
    let sid = ctx.sid;
    let user = ctx.username();
    let Some(pending) = ctx.state.confirm.take() else {
        return Err(Status::OperationFailed("no confirmed commit pending".to_string()));
    };
    if !pending.may_complete(sid, persist_id.as_deref()) {
        ctx.state.confirm = Some(pending);
        return Err(Status::AccessDenied);
    }
    ctx.state.running.restore(pending.snapshot);
    publish_confirm_event(ctx.state, ctx.profile, sid, &user, CommitEvent::Cancel);
    Ok(RpcOutput::Ok)
}

pub fn discard_changes(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    skip_remaining(ctx)?;
    let state = &mut *ctx.state;
    let running = &state.running;
    let Some(candidate) = state.candidate.as_mut() else {
        return Err(Status::OperationNotSupported("no candidate".to_string()));
    };
    if let Some(holder) = candidate.lock_holder() {
        if holder != ctx.sid {
            return Err(Status::InUse);
        }
    }
    candidate.copy_from(running);
    Ok(RpcOutput::Ok)
}

pub fn validate(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("source".to_string()));
    }
    let mut checked = false;
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "source" => {
                while let Some(inner) = next_param(ctx.reader)? {
                    match inner.name.as_str() {
                        "config" => {
                            let tree = parse_config_fragment(ctx.reader, ctx.state)?;
                            if let Some(root) = tree.root() {
                                run_checks(ctx, &tree, root)?;
                            }
                            checked = true;
                        }
                        name => match ncs_store::DatastoreName::parse(name) {
                            Some(ds_name) => {
                                skip_param(ctx.reader, inner.empty)?;
                                let ds = ctx.state.datastore(ds_name).ok_or_else(|| {
                                    Status::InvalidValue(format!("no {ds_name} datastore"))
                                })?;
                                let tree = ds.tree().clone();
                                let root = ds.root();
                                run_checks(ctx, &tree, root)?;
                                checked = true;
                            }
                            None => {
                                skip_param(ctx.reader, inner.empty)?;
                                return Err(Status::BadElement(name.to_string()));
                            }
                        },
                    }
                }
            }
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    if !checked {
        return Err(Status::MissingElement("source".to_string()));
    }
    if ctx.errors.is_empty() {
        Ok(RpcOutput::Ok)
    } else {
        Err(Status::OperationFailed("validate".to_string()))
    }
}

fn run_checks(
    ctx: &mut RpcContext<'_>,
    tree: &ncs_core::value::ValueTree,
    root: ncs_core::value::NodeId,
) -> Result<(), Status> {
    for ce in check::root_check(tree, root, &ctx.state.schema) {
        ctx.errors.push(RpcError::from_status(&ce.status).with_path(ce.path));
    }
    Ok(())
}

fn skip_remaining(ctx: &mut RpcContext<'_>) -> Result<(), Status> {
    if ctx.op_empty {
        return Ok(());
    }
    while let Some(p) = next_param(ctx.reader)? {
        skip_param(ctx.reader, p.empty)?;
    }
    Ok(())
}

/// Expiry sweep driven by the timer service: a confirmed commit past
/// its deadline restores the pre-commit snapshot and announces the
/// timeout.
pub fn check_confirm_expiry(state: &mut ServerState, profile: &crate::profile::Profile) {
    let now = Utc::now();
    let expired = state.confirm.as_ref().is_some_and(|c| c.expired(now));
    if !expired {
        return;
    }
    if let Some(pending) = state.confirm.take() {
        let sid = pending.sid;
        let user = state
            .sessions
            .get(sid)
            .map(|s| s.username().to_string())
            .unwrap_or_else(|| "server".to_string());
        state.running.restore(pending.snapshot);
        tracing::info!(session = %sid, "confirmed commit timed out, running restored");
        publish_confirm_event(state, profile, sid, &user, CommitEvent::Timeout);
    }
}

/// Session-teardown hook: a dying session cancels its own
/// non-persisted confirmed commit.
pub fn cancel_confirm_for_session(
    state: &mut ServerState,
    profile: &crate::profile::Profile,
    sid: ncs_core::id::SessionId,
) {
    let cancels = state.confirm.as_ref().is_some_and(|c| c.cancelled_by_session_end(sid));
    if !cancels {
        return;
    }
    if let Some(pending) = state.confirm.take() {
        let user = state
            .sessions
            .get(sid)
            .map(|s| s.username().to_string())
            .unwrap_or_else(|| "server".to_string());
        state.running.restore(pending.snapshot);
        tracing::info!(session = %sid, "session ended, confirmed commit rolled back");
        publish_confirm_event(state, profile, sid, &user, CommitEvent::Cancel);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<edit-config>`, `<copy-config>` and `<delete-config>`.

use ncs_core::error::Status;
use ncs_core::value::{EditOp, ValueTree};
use ncs_store::DatastoreName;
use std::cell::RefCell;

use crate::acm::Access;
use crate::ops::{
    next_param, parse_config_fragment, parse_datastore_ref, read_text, skip_param, RpcContext,
    RpcOutput,
};
use crate::profile::TargetStore;
use crate::txn::{ErrorOption, Transaction, TxnOutcome};

pub fn edit_config(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("target".to_string()));
    }
    let mut target = None;
    let mut default_op = None;
    let mut error_opt = ErrorOption::RollbackOnError;
    let mut config: Option<ValueTree> = None;

    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "target" => target = Some(parse_datastore_ref(ctx.reader, "target", p.empty)?),
            "default-operation" => {
                let text = read_text(ctx.reader)?;
                match text.as_str() {
                    "none" => default_op = None,
                    other => {
                        default_op = Some(
                            EditOp::parse(other)
                                .ok_or_else(|| Status::InvalidValue(text.clone()))?,
                        );
                    }
                }
            }
            "error-option" => {
                let text = read_text(ctx.reader)?;
                error_opt = ErrorOption::parse(&text)
                    .ok_or_else(|| Status::InvalidValue(text.clone()))?;
            }
            "test-option" => {
                // set-then-validate is the only behavior offered
                let _ = read_text(ctx.reader)?;
            }
            "config" => {
                if p.empty {
                    config = Some(ValueTree::new());
                } else {
                    config = Some(parse_config_fragment(ctx.reader, ctx.state)?);
                }
            }
            "url" => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::OperationNotSupported("url source".to_string()));
            }
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }

    let target = target.ok_or_else(|| Status::MissingElement("target".to_string()))?;
    check_target_matches_profile(ctx, target)?;
    let config = config.ok_or_else(|| Status::MissingElement("config".to_string()))?;

    check_write_access(ctx, target, &config)?;

    let sid = ctx.sid;
    let message_id = ctx.message_id.clone();
    let mut txn = Transaction::new(ctx.state, ctx.profile, sid, target);
    let outcome = txn.run_edit(&config, default_op, error_opt, message_id, &mut ctx.errors)?;
    match outcome {
        TxnOutcome::Committed(_) | TxnOutcome::NoOp => {
            if ctx.errors.is_empty() {
                Ok(RpcOutput::Ok)
            } else {
                // stop/continue-on-error: partial application with errors
                Err(Status::PartialOperation)
            }
        }
        TxnOutcome::Parked(_) => Ok(RpcOutput::Parked),
        TxnOutcome::Failed => Err(Status::OperationFailed("edit-config".to_string())),
    }
}

pub fn copy_config(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("target".to_string()));
    }
    let mut target = None;
    let mut source_ds = None;
    let mut source_inline: Option<ValueTree> = None;

    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "target" => target = Some(parse_datastore_ref(ctx.reader, "target", p.empty)?),
            "source" => {
                // source is either a datastore name or an inline config
                while let Some(inner) = next_param(ctx.reader)? {
                    match inner.name.as_str() {
                        "config" => {
                            source_inline =
                                Some(parse_config_fragment(ctx.reader, ctx.state)?);
                        }
                        "url" => {
                            skip_param(ctx.reader, inner.empty)?;
                            return Err(Status::OperationNotSupported(
                                "url source".to_string(),
                            ));
                        }
                        name => match DatastoreName::parse(name) {
                            Some(ds) => {
                                source_ds = Some(ds);
                                skip_param(ctx.reader, inner.empty)?;
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

    let target = target.ok_or_else(|| Status::MissingElement("target".to_string()))?;
    if source_ds == Some(target) {
        return Err(Status::InvalidValue("source equals target".to_string()));
    }

    // wholesale replacement invalidates partial-lock node sets
    if target == DatastoreName::Running && !ctx.state.plocks.is_empty() {
        return Err(Status::InUse);
    }

    let staged = match (source_ds, source_inline) {
        (Some(src), None) => {
            let ds = ctx
                .state
                .datastore(src)
                .ok_or_else(|| Status::InvalidValue(format!("no {src} datastore")))?;
            if !ds.is_ready() {
                return Err(Status::ResourceDenied(format!("{src} not ready")));
            }
            ds.tree().clone()
        }
        (None, Some(tree)) => normalize_inline(tree),
        _ => return Err(Status::MissingElement("source".to_string())),
    };

    check_write_access(ctx, target, &staged)?;

    let sid = ctx.sid;
    let message_id = ctx.message_id.clone();
    let mut txn = Transaction::new(ctx.state, ctx.profile, sid, target);
    match txn.run_replace(staged, message_id, &mut ctx.errors)? {
        TxnOutcome::Committed(_) | TxnOutcome::NoOp => Ok(RpcOutput::Ok),
        TxnOutcome::Parked(_) => Ok(RpcOutput::Parked),
        TxnOutcome::Failed => Err(Status::OperationFailed("copy-config".to_string())),
    }
}

pub fn delete_config(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("target".to_string()));
    }
    let mut target = None;
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "target" => target = Some(parse_datastore_ref(ctx.reader, "target", p.empty)?),
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    let target = target.ok_or_else(|| Status::MissingElement("target".to_string()))?;
    // only a distinct startup store may be deleted
    if target != DatastoreName::Startup {
        return Err(Status::OperationNotSupported(format!("delete-config {target}")));
    }
    let Some(startup) = ctx.state.startup.as_mut() else {
        return Err(Status::InvalidValue("no startup datastore".to_string()));
    };
    if let Some(holder) = startup.lock_holder() {
        if holder != ctx.sid {
            return Err(Status::InUse);
        }
    }
    startup.clear();
    Ok(RpcOutput::Ok)
}

/// The configured edit target must exist; editing running directly is
/// only allowed when the profile targets running.
fn check_target_matches_profile(
    ctx: &RpcContext<'_>,
    target: DatastoreName,
) -> Result<(), Status> {
    match target {
        DatastoreName::Running if ctx.profile.target == TargetStore::Candidate => {
            Err(Status::OperationNotSupported("writable-running".to_string()))
        }
        DatastoreName::Candidate if !ctx.profile.has_candidate() => {
            Err(Status::InvalidValue("no candidate datastore".to_string()))
        }
        DatastoreName::Startup => {
            Err(Status::OperationNotSupported("edit-config on startup".to_string()))
        }
        _ => Ok(()),
    }
}

/// Pre-transaction write gate: every top-level subtree the edit names
/// must be writable by this user. Rejection happens before any
/// datastore mutation.
fn check_write_access(
    ctx: &mut RpcContext<'_>,
    target: DatastoreName,
    edits: &ValueTree,
) -> Result<(), Status> {
    let Some(edit_root) = edits.root() else { return Ok(()) };
    let user = ctx.username();
    let sid = ctx.sid;
    let profile = ctx.profile;
    let state = &mut *ctx.state;
    let nacm_ns = state.wk.nacm;
    // field-level access keeps the tree borrow disjoint from the
    // access-control cache
    let (tree, root) = match target {
        DatastoreName::Running => (state.running.tree(), state.running.root()),
        DatastoreName::Candidate => match state.candidate.as_ref() {
            Some(c) => (c.tree(), c.root()),
            None => return Err(Status::InvalidValue("no candidate datastore".to_string())),
        },
        DatastoreName::Startup => match state.startup.as_ref() {
            Some(s) => (s.tree(), s.root()),
            None => return Err(Status::InvalidValue("no startup datastore".to_string())),
        },
    };
    let acm = RefCell::new(&mut state.acm);
    for top in edits.children(edit_root) {
        let Some(enode) = edits.node(*top) else { continue };
        // decide against the existing node when present, else the root
        let probe = tree.find_child(root, enode.ns, &enode.name).unwrap_or(root);
        let allowed = acm.borrow_mut().data_allowed(
            profile, sid, &user, tree, root, nacm_ns, probe, Access::Write,
        );
        if !allowed {
            return Err(Status::AccessDenied);
        }
    }
    Ok(())
}

/// Re-root an inline copy-config source on a datastore-shaped tree and
/// strip any stray edit annotations.
fn normalize_inline(src: ValueTree) -> ValueTree {
    use ncs_core::value::{ValueKind, ValueNode};
    use ncs_core::xmlns::NsId;
    let (mut out, out_root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    if let Some(src_root) = src.root() {
        for child in src.children(src_root) {
            out.copy_subtree_from(&src, *child, Some(out_root));
        }
    }
    out
}

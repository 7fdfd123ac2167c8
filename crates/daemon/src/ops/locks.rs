// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global `<lock>`/`<unlock>` and RFC 5717 partial locks.

use chrono::Utc;
use ncs_core::error::Status;
use ncs_core::id::LockId;
use ncs_core::rpcerr::{ErrorInfo, RpcError};
use ncs_core::xpath::XPathProgram;
use ncs_store::{DatastoreName, StoreError};
use ncs_wire::writer::XmlWriter;

use crate::ops::{next_param, parse_datastore_ref, read_text, skip_param, RpcContext, RpcOutput};

pub fn lock(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let target = parse_lock_target(ctx)?;

    // the candidate may only be locked while unmodified
    if target == DatastoreName::Candidate {
        let state = &*ctx.state;
        if let Some(candidate) = state.candidate.as_ref() {
            let same = candidate.tree().subtree_equal(
                candidate.root(),
                state.running.tree(),
                state.running.root(),
            );
            if !same {
                return Err(Status::InUse);
            }
        }
    }

    let sid = ctx.sid;
    let ds = ctx
        .state
        .datastore_mut(target)
        .ok_or_else(|| Status::InvalidValue(format!("no {target} datastore")))?;
    match ds.lock(sid) {
        Ok(()) => Ok(RpcOutput::Ok),
        Err(StoreError::Locked { holder, .. }) => {
            let status = Status::LockDenied(holder.0);
            ctx.errors.push(
                RpcError::from_status(&status).with_info(ErrorInfo::SessionId(holder.0)),
            );
            Err(status)
        }
        Err(e) => Err(Status::OperationFailed(e.to_string())),
    }
}

pub fn unlock(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let target = parse_lock_target(ctx)?;
    let sid = ctx.sid;
    let ds = ctx
        .state
        .datastore_mut(target)
        .ok_or_else(|| Status::InvalidValue(format!("no {target} datastore")))?;
    match ds.unlock(sid) {
        Ok(()) => Ok(RpcOutput::Ok),
        Err(StoreError::Locked { holder, .. }) => {
            let status = Status::LockDenied(holder.0);
            ctx.errors.push(
                RpcError::from_status(&status).with_info(ErrorInfo::SessionId(holder.0)),
            );
            Err(status)
        }
        Err(e) => Err(Status::OperationFailed(e.to_string())),
    }
}

fn parse_lock_target(ctx: &mut RpcContext<'_>) -> Result<DatastoreName, Status> {
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
    target.ok_or_else(|| Status::MissingElement("target".to_string()))
}

pub fn partial_lock(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("select".to_string()));
    }
    let mut selects: Vec<String> = Vec::new();
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "select" => selects.push(read_text(ctx.reader)?),
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    if selects.is_empty() {
        return Err(Status::MissingElement("select".to_string()));
    }

    // partial locks apply to running only
    let state = &mut *ctx.state;
    if !state.running.is_ready() {
        return Err(Status::ResourceDenied("running not ready".to_string()));
    }

    // compile each select against the message's namespace context and
    // take the union of the matched node sets
    let mut nodes = Vec::new();
    {
        let reader = &*ctx.reader;
        let ns_reg = &state.ns;
        let resolve = |prefix: &str| {
            reader
                .uri_for_prefix(prefix)
                .map(|uri| ns_reg.lookup(uri))
                .filter(|id| !id.is_invalid())
        };
        for select in &selects {
            let prog = XPathProgram::compile(select, &resolve)
                .map_err(|e| Status::InvalidValue(e.to_string()))?;
            for hit in prog.eval(state.running.tree(), state.running.root()) {
                if !nodes.contains(&hit) {
                    nodes.push(hit);
                }
            }
        }
    }

    let sid = ctx.sid;
    match state.plocks.acquire(sid, Utc::now(), nodes, selects) {
        Ok(lock_id) => {
            let mut w = XmlWriter::new(&state.ns);
            w.leaf_element(state.wk.plock, "lock-id", &lock_id.to_string());
            Ok(RpcOutput::Data(w.finish()))
        }
        Err(status) => {
            if let Status::LockDenied(holder) = &status {
                ctx.errors.push(
                    RpcError::from_status(&status).with_info(ErrorInfo::SessionId(*holder)),
                );
            }
            Err(status)
        }
    }
}

pub fn partial_unlock(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("lock-id".to_string()));
    }
    let mut lock_id = None;
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "lock-id" => {
                let text = read_text(ctx.reader)?;
                lock_id =
                    Some(LockId(text.parse::<u32>().map_err(|_| Status::InvalidValue(text))?));
            }
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    let lock_id = lock_id.ok_or_else(|| Status::MissingElement("lock-id".to_string()))?;
    let sid = ctx.sid;
    match ctx.state.plocks.release(sid, lock_id) {
        Ok(()) => Ok(RpcOutput::Ok),
        Err(status) => {
            if let Status::LockDenied(holder) = &status {
                ctx.errors.push(
                    RpcError::from_status(&status).with_info(ErrorInfo::SessionId(*holder)),
                );
            }
            Err(status)
        }
    }
}

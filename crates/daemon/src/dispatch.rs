// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message dispatch core.
//!
//! Each framed inbound message drives one pass: classify the top
//! element by `(namespace, local-name)`, gate it against the session's
//! lifecycle state, and route to the connect, hello or RPC path. RPC
//! replies always go out as a well-formed `<rpc-reply>`.

use ncs_core::error::Status;
use ncs_core::id::{MsgId, SessionId};
use ncs_core::rpcerr::{RpcError, RpcErrorList};
use ncs_wire::msg::{ReplyBody, ReplyBuilder};
use ncs_wire::reader::{XmlEvent, XmlReader};
use tracing::{debug, warn};

use crate::connect;
use crate::hello;
use crate::notif::{EventKind, Notification};
use crate::ops::{RpcContext, RpcOutput};
use crate::profile::Profile;
use crate::server::{Server, ServerState};
use crate::session::{DropReason, Instate};
use crate::txn;

/// Outcome the listener acts on after one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    /// Tear the connection down after flushing queued output.
    CloseSession,
}

/// Process one complete inbound message for a session.
pub fn process_message(server: &Server, sid: SessionId, bytes: Vec<u8>) -> DispatchOutcome {
    let mut state = server.state.lock();
    let profile = &server.profile;

    let lookup = state.ns_lookup();
    let mut reader = XmlReader::new(bytes, lookup);

    let first = loop {
        match reader.next_event() {
            Ok(XmlEvent::Text(_)) => continue,
            Ok(ev) => break ev,
            Err(e) => {
                warn!(session = %sid, error = %e, "malformed message");
                return fail_session(&mut state, sid, DropReason::BadStart);
            }
        }
    };

    let (_ns, name, attrs, empty) = match &first {
        XmlEvent::Start { ns, name, attrs } => (*ns, name.clone(), attrs.clone(), false),
        XmlEvent::Empty { ns, name, attrs } => (*ns, name.clone(), attrs.clone(), true),
        _ => {
            return fail_session(&mut state, sid, DropReason::BadStart);
        }
    };

    match name.as_str() {
        "ncx-connect" => {
            match connect::handle_connect(&mut state, profile, sid, &attrs, empty) {
                Ok(()) => DispatchOutcome::Continue,
                Err(status) => {
                    debug!(session = %sid, error = %status, "connect rejected");
                    fail_session(&mut state, sid, DropReason::BadStart)
                }
            }
        }
        "hello" => match hello::handle_client_hello(&mut state, sid, &mut reader, empty) {
            Ok(()) => DispatchOutcome::Continue,
            Err(status) => {
                debug!(session = %sid, error = %status, "hello rejected");
                fail_session(&mut state, sid, DropReason::BadHello)
            }
        },
        "rpc" => handle_rpc(server, &mut state, sid, &mut reader, &attrs, empty),
        other => {
            warn!(session = %sid, element = other, "unknown top-level element");
            fail_session(&mut state, sid, DropReason::BadStart)
        }
    }
}

/// The `<rpc>` path: state gate, access control, handler table, reply.
fn handle_rpc(
    server: &Server,
    state: &mut ServerState,
    sid: SessionId,
    reader: &mut XmlReader,
    rpc_attrs: &[ncs_wire::reader::XmlAttr],
    rpc_empty: bool,
) -> DispatchOutcome {
    let profile = &server.profile;
    let now = chrono::Utc::now();

    {
        let Some(sess) = state.sessions.get_mut(sid) else {
            return DispatchOutcome::CloseSession;
        };
        if sess.instate != Instate::Idle {
            warn!(session = %sid, state = ?sess.instate, "rpc outside idle state");
            return fail_session(state, sid, DropReason::Other);
        }
        sess.instate = Instate::InMsg;
        sess.counters.in_rpcs += 1;
        sess.touch_rpc(now);
    }

    // message-id is opaque; a missing one still gets a reply
    let message_id: Option<MsgId> =
        rpc_attrs.iter().find(|a| a.name == "message-id").map(|a| MsgId(a.value.clone()));

    let nc = state.wk.nc;

    // the operation element
    let op = if rpc_empty {
        None
    } else {
        loop {
            match reader.next_event() {
                Ok(XmlEvent::Start { ns, name, attrs }) => break Some((ns, name, attrs, false)),
                Ok(XmlEvent::Empty { ns, name, attrs }) => break Some((ns, name, attrs, true)),
                Ok(XmlEvent::Text(_)) => continue,
                Ok(_) => break None,
                Err(_) => break None,
            }
        }
    };
    let Some((op_ns, op_name, op_attrs, op_empty)) = op else {
        let mut errors = RpcErrorList::new();
        errors.push_status(&Status::MissingElement("rpc operation".to_string()));
        bump_bad_rpc(state, sid);
        return send_reply(state, sid, message_id, ReplyBody::Errors(errors), nc);
    };

    // access control: may this user run the operation at all?
    let user = state.sessions.get(sid).map(|s| s.username().to_string()).unwrap_or_default();
    let module = state
        .schema
        .modules()
        .iter()
        .find(|m| m.ns == op_ns)
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "ietf-netconf".to_string());
    let running_root = state.running.root();
    let nacm_ns = state.wk.nacm;
    let allowed = {
        // the rule snapshot evaluates against the running tree
        let tree = state.running.tree().clone();
        state.acm.rpc_allowed(profile, sid, &user, &tree, running_root, nacm_ns, &module, &op_name)
    };
    if !allowed {
        let mut errors = RpcErrorList::new();
        errors.push_status(&Status::AccessDenied);
        finish_rpc(state, sid);
        return send_reply(state, sid, message_id, ReplyBody::Errors(errors), nc);
    }

    // handler lookup: exact pair, then the base namespace fallback for
    // clients that inherit the rpc element's default namespace
    let handler = server
        .op_table
        .get(&(op_ns, op_name.clone()))
        .or_else(|| server.op_table.get(&(nc, op_name.clone())))
        .or_else(|| server.op_table.iter().find(|((_, n), _)| *n == op_name).map(|(_, h)| h))
        .copied();
    let Some(handler) = handler else {
        let mut errors = RpcErrorList::new();
        errors.push_status(&Status::OperationNotSupported(op_name.clone()));
        bump_bad_rpc(state, sid);
        finish_rpc(state, sid);
        return send_reply(state, sid, message_id, ReplyBody::Errors(errors), nc);
    };

    let mut ctx = RpcContext {
        state,
        profile,
        sid,
        reader,
        op_ns,
        op_name: op_name.clone(),
        op_attrs,
        op_empty,
        message_id: message_id.clone(),
        errors: RpcErrorList::new(),
    };
    let result = handler(&mut ctx);
    let errors = std::mem::take(&mut ctx.errors);

    match result {
        Ok(RpcOutput::Ok) => {
            finish_rpc(state, sid);
            send_reply(state, sid, message_id, ReplyBody::Ok, nc)
        }
        Ok(RpcOutput::Data(inner)) => {
            finish_rpc(state, sid);
            send_reply(state, sid, message_id, ReplyBody::Data(inner), nc)
        }
        Ok(RpcOutput::OkThenClose) => {
            send_reply(state, sid, message_id, ReplyBody::Ok, nc);
            DispatchOutcome::CloseSession
        }
        Ok(RpcOutput::Parked) => {
            // reply comes when the completion record arrives
            debug!(session = %sid, op = %op_name, "rpc parked");
            DispatchOutcome::Continue
        }
        Err(status) if status.is_fatal() => {
            let mut errors = errors;
            errors.push_status(&status);
            bump_bad_rpc(state, sid);
            let _ = send_reply(state, sid, message_id, ReplyBody::Errors(errors), nc);
            fail_session(state, sid, DropReason::Other)
        }
        Err(status) => {
            let mut errors = errors;
            if errors.is_empty() {
                errors.push(RpcError::from_status(&status));
            }
            finish_rpc(state, sid);
            send_reply(state, sid, message_id, ReplyBody::Errors(errors), nc)
        }
    }
}

fn finish_rpc(state: &mut ServerState, sid: SessionId) {
    if let Some(sess) = state.sessions.get_mut(sid) {
        if sess.instate == Instate::InMsg {
            sess.instate = Instate::Idle;
        }
    }
}

fn bump_bad_rpc(state: &mut ServerState, sid: SessionId) {
    if let Some(sess) = state.sessions.get_mut(sid) {
        sess.counters.bad_rpcs += 1;
    }
}

fn send_reply(
    state: &mut ServerState,
    sid: SessionId,
    message_id: Option<MsgId>,
    body: ReplyBody,
    nc: ncs_core::xmlns::NsId,
) -> DispatchOutcome {
    let is_error = matches!(body, ReplyBody::Errors(_) | ReplyBody::ErrorsAndData(..));
    let reply = ReplyBuilder::new(nc, message_id).build(&state.ns, body);
    if let Some(sess) = state.sessions.get_mut(sid) {
        sess.send(reply.as_bytes());
        if is_error {
            sess.counters.out_rpc_errors += 1;
        }
    }
    DispatchOutcome::Continue
}

/// Send the reply for a completed parked transaction.
pub fn reply_for_parked(
    state: &mut ServerState,
    parked: txn::ParkedTransaction,
    result: Result<(), Status>,
) {
    let nc = state.wk.nc;
    let body = match result {
        Ok(()) => ReplyBody::Ok,
        Err(status) => {
            let mut errors = RpcErrorList::new();
            errors.push_status(&status);
            ReplyBody::Errors(errors)
        }
    };
    let sid = parked.sid;
    send_reply(state, sid, parked.message_id, body, nc);
    finish_rpc(state, sid);
}

/// Mark the session for teardown; the listener flushes queued output
/// and then runs the full cleanup.
fn fail_session(state: &mut ServerState, sid: SessionId, reason: DropReason) -> DispatchOutcome {
    if let Some(sess) = state.sessions.get_mut(sid) {
        sess.drop_reason = Some(reason);
        sess.instate = Instate::ShutdownReq;
    }
    DispatchOutcome::CloseSession
}

/// Full teardown bookkeeping once the connection is done: locks,
/// partial locks, access-control cache, confirmed commit, slot release
/// and the sysSessionEnd notification.
pub fn teardown_session(state: &mut ServerState, profile: &Profile, sid: SessionId) {
    crate::ops::cancel_confirm_for_session(state, profile, sid);

    state.running.release_lock_for(sid);
    if let Some(c) = state.candidate.as_mut() {
        c.release_lock_for(sid);
    }
    if let Some(s) = state.startup.as_mut() {
        s.release_lock_for(sid);
    }
    state.plocks.release_session(sid);
    state.acm.forget_session(sid);

    let info = state.sessions.get(sid).map(|s| {
        (
            s.username().to_string(),
            s.peer.clone().unwrap_or_default(),
            s.drop_reason.unwrap_or(DropReason::Closed),
            s.user.is_some(),
        )
    });
    if let Some((user, peer, reason, connected)) = info {
        if connected {
            let killed_by = match reason {
                DropReason::Killed(by) => Some(by),
                _ => None,
            };
            state.publish(
                profile,
                Notification {
                    time: chrono::Utc::now(),
                    kind: EventKind::SessionEnd {
                        sid,
                        user,
                        peer,
                        reason: reason.as_str().to_string(),
                        killed_by,
                    },
                },
            );
        }
    }
    if let Some(sess) = state.sessions.release(sid) {
        debug!(session = %sid, user = %sess.username(), "session released");
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<get>` and `<get-config>`.
//!
//! Retrieval runs the source tree through the subtree/XPath filter with
//! per-node access-control read gating, applies the requested
//! with-defaults mode and serializes the result. `<get>` additionally
//! merges the read-only netconf-state virtual nodes.

use ncs_core::error::Status;
use ncs_core::value::{NodeId, ValueKind, ValueNode, ValueTree};
use ncs_store::{DatastoreName, GetFilter, WithDefaults};
use ncs_wire::writer::XmlWriter;
use std::cell::RefCell;

use crate::acm::Access;
use crate::ops::{next_param, parse_datastore_ref, parse_filter, read_text, skip_param};
use crate::ops::{RpcContext, RpcOutput};

pub fn get_config(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let mut source = None;
    let mut filter = None;
    let mut wd = None;
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "source" => source = Some(parse_datastore_ref(ctx.reader, "source", p.empty)?),
                "filter" => filter = parse_filter(ctx.reader, &p.attrs, p.empty)?,
                "with-defaults" => {
                    let text = read_text(ctx.reader)?;
                    wd = WithDefaults::parse(&text);
                    if wd.is_none() {
                        return Err(Status::InvalidValue(text));
                    }
                }
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }
    let source = source.ok_or_else(|| Status::MissingElement("source".to_string()))?;
    retrieve(ctx, source, filter, wd, false)
}

pub fn get(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let mut filter = None;
    let mut wd = None;
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "filter" => filter = parse_filter(ctx.reader, &p.attrs, p.empty)?,
                "with-defaults" => {
                    let text = read_text(ctx.reader)?;
                    wd = WithDefaults::parse(&text);
                    if wd.is_none() {
                        return Err(Status::InvalidValue(text));
                    }
                }
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }
    retrieve(ctx, DatastoreName::Running, filter, wd, true)
}

/// Shared retrieval path.
fn retrieve(
    ctx: &mut RpcContext<'_>,
    source: DatastoreName,
    filter: Option<GetFilter>,
    wd: Option<WithDefaults>,
    include_state: bool,
) -> Result<RpcOutput, Status> {
    let user = ctx.username();
    let sid = ctx.sid;
    let profile = ctx.profile;
    let state = &mut *ctx.state;

    let ds = state
        .datastore(source)
        .ok_or_else(|| Status::InvalidValue(format!("no {source} datastore")))?;
    if !ds.is_ready() {
        return Err(Status::ResourceDenied(format!("{source} not ready")));
    }

    // the source tree, with virtual state data appended for <get>
    let mut src = ds.tree().clone();
    let src_root = ds.root();
    if include_state {
        append_netconf_state(&mut src, src_root, state);
    }

    let nacm_ns = state.wk.nacm;
    let acm = RefCell::new(&mut state.acm);
    let read_ok = |tree: &ValueTree, node: NodeId| {
        acm.borrow_mut().data_allowed(
            profile, sid, &user, tree, src_root, nacm_ns, node, Access::Read,
        )
    };
    let (mut out, out_root) =
        ncs_store::filter::apply(&src, src_root, filter.as_ref(), &read_ok, &state.schema);

    // with-defaults: explicit request > session preference > basic mode
    let mode = wd
        .or_else(|| state.sessions.get(sid).and_then(|s| s.display.with_defaults))
        .unwrap_or(profile.with_defaults);
    ncs_store::filter::apply_with_defaults(&mut out, out_root, mode, &state.schema, state.wk.wd);

    let mut w = XmlWriter::new(&state.ns);
    for child in out.children(out_root).to_vec() {
        w.value_subtree(&out, child);
    }
    Ok(RpcOutput::Data(w.finish()))
}

/// Synthesize the netconf-state sessions / statistics subtree from the
/// live session table.
fn append_netconf_state(src: &mut ValueTree, src_root: NodeId, state: &crate::server::ServerState) {
    let ncm = state.wk.ncm;
    let Some(ncstate_sid) = state.schema.top(ncm, "netconf-state") else { return };
    let ncstate = src.add_child(
        src_root,
        ValueNode::new(ncm, "netconf-state", ValueKind::Container).with_schema(ncstate_sid),
    );

    let sessions = src.add_child(ncstate, ValueNode::new(ncm, "sessions", ValueKind::Container));
    let mut total_in = 0u64;
    let mut total_bad = 0u64;
    let mut active = 0u32;
    for sess in state.sessions.iter() {
        active += 1;
        total_in += sess.counters.in_rpcs;
        total_bad += sess.counters.bad_rpcs;
        let entry = src.add_child(sessions, ValueNode::new(ncm, "session", ValueKind::List));
        let mut leaf = |tree: &mut ValueTree, name: &str, value: String| {
            tree.add_child(entry, ValueNode::new(ncm, name, ValueKind::Leaf(value)));
        };
        leaf(src, "session-id", sess.sid.to_string());
        leaf(src, "username", sess.username().to_string());
        leaf(src, "source-host", sess.peer.clone().unwrap_or_default());
        leaf(
            src,
            "transport",
            sess.transport.map(|t| t.as_str().to_string()).unwrap_or_default(),
        );
        leaf(src, "login-time", sess.started_at.to_rfc3339());
        leaf(src, "in-rpcs", sess.counters.in_rpcs.to_string());
        leaf(src, "in-bad-rpcs", sess.counters.bad_rpcs.to_string());
        leaf(src, "out-rpc-errors", sess.counters.out_rpc_errors.to_string());
        leaf(src, "out-notifications", sess.counters.out_notifications.to_string());
    }

    let stats = src.add_child(ncstate, ValueNode::new(ncm, "statistics", ValueKind::Container));
    src.add_child(stats, ValueNode::new(ncm, "active-sessions", ValueKind::Leaf(active.to_string())));
    src.add_child(stats, ValueNode::new(ncm, "in-rpcs", ValueKind::Leaf(total_in.to_string())));
    src.add_child(stats, ValueNode::new(ncm, "in-bad-rpcs", ValueKind::Leaf(total_bad.to_string())));
}

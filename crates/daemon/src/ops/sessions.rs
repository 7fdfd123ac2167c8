// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-scoped operations: close/kill-session, notification
//! subscription, get-schema and the per-session display parameters.

use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_store::WithDefaults;
use ncs_wire::writer::{escape, XmlWriter};
use std::fs;

use crate::ops::{next_param, read_text, skip_param, RpcContext, RpcOutput};
use crate::session::DropReason;

pub fn close_session(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    skip_all(ctx)?;
    if let Some(sess) = ctx.state.sessions.get_mut(ctx.sid) {
        sess.drop_reason = Some(DropReason::Closed);
        sess.instate = crate::session::Instate::ShutdownReq;
    }
    Ok(RpcOutput::OkThenClose)
}

pub fn kill_session(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("session-id".to_string()));
    }
    let mut target = None;
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "session-id" => {
                let text = read_text(ctx.reader)?;
                target = Some(SessionId(
                    text.parse::<u32>().map_err(|_| Status::InvalidValue(text))?,
                ));
            }
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    let target = target.ok_or_else(|| Status::MissingElement("session-id".to_string()))?;
    if target == ctx.sid {
        return Err(Status::InvalidValue("cannot kill own session".to_string()));
    }
    let killer = ctx.sid;
    let Some(victim) = ctx.state.sessions.get_mut(target) else {
        return Err(Status::InvalidValue(format!("no session {target}")));
    };
    victim.drop_reason = Some(DropReason::Killed(killer));
    victim.instate = crate::session::Instate::ShutdownReq;
    // queued replies drain first; the close marker rides behind them
    victim.send_close();
    Ok(RpcOutput::Ok)
}

pub fn create_subscription(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "stream" => {
                    let stream = read_text(ctx.reader)?;
                    if stream != "NETCONF" {
                        return Err(Status::InvalidValue(stream));
                    }
                }
                "filter" => skip_param(ctx.reader, p.empty)?,
                "startTime" => {
                    // no replay support on the NETCONF stream
                    return Err(Status::OperationNotSupported("startTime".to_string()));
                }
                "stopTime" => {
                    return Err(Status::OperationNotSupported("stopTime".to_string()));
                }
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }
    let Some(sess) = ctx.state.sessions.get_mut(ctx.sid) else {
        return Err(Status::Internal("session vanished".to_string()));
    };
    if sess.subscribed {
        return Err(Status::InUse);
    }
    sess.subscribed = true;
    Ok(RpcOutput::Ok)
}

pub fn get_schema(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    if ctx.op_empty {
        return Err(Status::MissingElement("identifier".to_string()));
    }
    let mut identifier = None;
    let mut version = None;
    while let Some(p) = next_param(ctx.reader)? {
        match p.name.as_str() {
            "identifier" => identifier = Some(read_text(ctx.reader)?),
            "version" => version = Some(read_text(ctx.reader)?),
            "format" => {
                let format = read_text(ctx.reader)?;
                if format != "yang" {
                    return Err(Status::OperationNotSupported(format));
                }
            }
            other => {
                skip_param(ctx.reader, p.empty)?;
                return Err(Status::UnknownElement(other.to_string()));
            }
        }
    }
    let identifier =
        identifier.ok_or_else(|| Status::MissingElement("identifier".to_string()))?;
    if ctx.state.schema.module_by_name(&identifier).is_none() {
        return Err(Status::InvalidValue(identifier));
    }

    // scan the module search path in order for the source file
    let mut candidates = vec![format!("{identifier}.yang")];
    if let Some(version) = &version {
        candidates.insert(0, format!("{identifier}@{version}.yang"));
    }
    for dir in &ctx.profile.module_path {
        for name in &candidates {
            let path = dir.join(name);
            if let Ok(text) = fs::read_to_string(&path) {
                return Ok(RpcOutput::Data(escape(&text)));
            }
        }
    }
    Err(Status::InvalidValue(format!("no schema source for {identifier}")))
}

pub fn get_my_session(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    skip_all(ctx)?;
    let Some(sess) = ctx.state.sessions.get(ctx.sid) else {
        return Err(Status::Internal("session vanished".to_string()));
    };
    let ncx = ctx.state.wk.ncx;
    let mut w = XmlWriter::new(&ctx.state.ns);
    w.leaf_element(ncx, "linesize", &sess.display.linesize.to_string());
    w.leaf_element(ncx, "indent", &sess.display.indent.to_string());
    if let Some(wd) = sess.display.with_defaults {
        w.leaf_element(ncx, "with-defaults", wd.as_str());
    }
    Ok(RpcOutput::Data(w.finish()))
}

pub fn set_my_session(ctx: &mut RpcContext<'_>) -> Result<RpcOutput, Status> {
    let mut linesize = None;
    let mut indent = None;
    let mut wd = None;
    if !ctx.op_empty {
        while let Some(p) = next_param(ctx.reader)? {
            match p.name.as_str() {
                "linesize" => {
                    let text = read_text(ctx.reader)?;
                    linesize =
                        Some(text.parse::<u32>().map_err(|_| Status::InvalidValue(text))?);
                }
                "indent" => {
                    let text = read_text(ctx.reader)?;
                    indent =
                        Some(text.parse::<u32>().map_err(|_| Status::InvalidValue(text))?);
                }
                "with-defaults" => {
                    let text = read_text(ctx.reader)?;
                    wd = Some(
                        WithDefaults::parse(&text).ok_or(Status::InvalidValue(text))?,
                    );
                }
                other => {
                    skip_param(ctx.reader, p.empty)?;
                    return Err(Status::UnknownElement(other.to_string()));
                }
            }
        }
    }
    let Some(sess) = ctx.state.sessions.get_mut(ctx.sid) else {
        return Err(Status::Internal("session vanished".to_string()));
    };
    if let Some(v) = linesize {
        sess.display.linesize = v;
    }
    if let Some(v) = indent {
        sess.display.indent = v;
    }
    if let Some(v) = wd {
        sess.display.with_defaults = Some(v);
    }
    Ok(RpcOutput::Ok)
}

fn skip_all(ctx: &mut RpcContext<'_>) -> Result<(), Status> {
    if ctx.op_empty {
        return Ok(());
    }
    while let Some(p) = next_param(ctx.reader)? {
        skip_param(ctx.reader, p.empty)?;
    }
    Ok(())
}

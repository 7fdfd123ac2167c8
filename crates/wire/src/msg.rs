// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<rpc-reply>` assembly.
//!
//! Every RPC produces a well-formed reply: `<ok/>`, a `<data>` payload,
//! or the accumulated `<rpc-error>` list. The triggering message-id is
//! echoed verbatim; if the peer omitted it, the reply carries none.

use crate::writer::XmlWriter;
use ncs_core::id::MsgId;
use ncs_core::rpcerr::{ErrorInfo, RpcError, RpcErrorList};
use ncs_core::xmlns::{NsId, NsRegistry};

/// Reply payload variants.
#[derive(Debug)]
pub enum ReplyBody {
    Ok,
    /// Pre-serialized inner XML of the `<data>` element.
    Data(String),
    Errors(RpcErrorList),
    /// Errors followed by partial data (continue-on-error edits).
    ErrorsAndData(RpcErrorList, String),
}

/// Builds one `<rpc-reply>` document.
pub struct ReplyBuilder {
    nc: NsId,
    message_id: Option<MsgId>,
    /// Attributes copied verbatim from the `<rpc>` element besides
    /// message-id, as the protocol requires.
    extra_attrs: Vec<(String, String)>,
}

impl ReplyBuilder {
    pub fn new(nc: NsId, message_id: Option<MsgId>) -> Self {
        Self { nc, message_id, extra_attrs: Vec::new() }
    }

    pub fn with_extra_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_attrs.push((name.into(), value.into()));
        self
    }

    pub fn build(self, reg: &NsRegistry, body: ReplyBody) -> String {
        let mut w = XmlWriter::new(reg);
        w.start_element(self.nc, "rpc-reply");
        if let Some(mid) = &self.message_id {
            w.attr("message-id", mid.as_str());
        }
        for (name, value) in &self.extra_attrs {
            w.attr(name, value);
        }
        match body {
            ReplyBody::Ok => {
                w.start_element(self.nc, "ok");
                w.end_element();
            }
            ReplyBody::Data(inner) => {
                w.start_element(self.nc, "data");
                w.raw(&inner);
                w.end_element();
            }
            ReplyBody::Errors(errors) => {
                for err in errors.iter() {
                    write_rpc_error(&mut w, self.nc, err);
                }
            }
            ReplyBody::ErrorsAndData(errors, inner) => {
                for err in errors.iter() {
                    write_rpc_error(&mut w, self.nc, err);
                }
                w.start_element(self.nc, "data");
                w.raw(&inner);
                w.end_element();
            }
        }
        w.end_element();
        w.finish()
    }
}

fn write_rpc_error(w: &mut XmlWriter<'_>, nc: NsId, err: &RpcError) {
    w.start_element(nc, "rpc-error");
    w.leaf_element(nc, "error-type", err.error_type.as_str());
    w.leaf_element(nc, "error-tag", err.error_tag.as_str());
    w.leaf_element(nc, "error-severity", err.severity.as_str());
    if let Some(app_tag) = &err.app_tag {
        w.leaf_element(nc, "error-app-tag", app_tag);
    }
    if let Some(path) = &err.path {
        w.leaf_element(nc, "error-path", path);
    }
    if let Some(message) = &err.message {
        w.start_element(nc, "error-message");
        if let Some(lang) = &err.language {
            w.attr("xml:lang", lang);
        }
        w.text(message);
        w.end_element();
    }
    if !err.info.is_empty() {
        w.start_element(nc, "error-info");
        for info in &err.info {
            write_error_info(w, nc, info);
        }
        w.end_element();
    }
    w.end_element();
}

fn write_error_info(w: &mut XmlWriter<'_>, nc: NsId, info: &ErrorInfo) {
    match info {
        ErrorInfo::BadElement(v)
        | ErrorInfo::BadNamespace(v)
        | ErrorInfo::MissingChoice(v)
        | ErrorInfo::NonUnique(v)
        | ErrorInfo::OkElement(v)
        | ErrorInfo::ErrElement(v)
        | ErrorInfo::NoopElement(v) => {
            w.leaf_element(nc, info.element_name(), v);
        }
        ErrorInfo::BadAttribute { attribute, element } => {
            w.leaf_element(nc, "bad-attribute", attribute);
            w.leaf_element(nc, "bad-element", element);
        }
        ErrorInfo::SessionId(sid) => {
            w.leaf_element(nc, "session-id", &sid.to_string());
        }
    }
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC operation handlers.
//!
//! Handlers are plain functions keyed by the operation element's
//! `(namespace, local-name)` pair in a table populated at module
//! registration; dispatch never goes through virtual calls. Each
//! handler parses its own payload from the message reader and returns
//! either a reply body or a parked marker.

mod commit;
mod edit;
mod get;
mod locks;
mod sessions;

pub use commit::{cancel_confirm_for_session, check_confirm_expiry};

use indexmap::IndexMap;
use ncs_core::error::Status;
use ncs_core::id::{MsgId, SessionId};
use ncs_core::rpcerr::RpcErrorList;
use ncs_core::schema::{SchemaId, SchemaKind};
use ncs_core::value::{EditMeta, EditOp, InsertPoint, NodeId, ValueKind, ValueNode, ValueTree};
use ncs_core::xmlns::{NsId, WellKnown};
use ncs_store::DatastoreName;
use ncs_wire::reader::{XmlAttr, XmlEvent, XmlReader};

use crate::profile::Profile;
use crate::server::ServerState;

/// What a handler produced.
#[derive(Debug)]
pub enum RpcOutput {
    Ok,
    /// Inner XML of the `<data>` reply element.
    Data(String),
    /// Transaction parked on a deferred apply; no reply yet.
    Parked,
    /// Reply normally, then tear the session down (close-session).
    OkThenClose,
}

/// Per-RPC context handed to every handler.
pub struct RpcContext<'a> {
    pub state: &'a mut ServerState,
    pub profile: &'a Profile,
    pub sid: SessionId,
    pub reader: &'a mut XmlReader,
    pub op_ns: NsId,
    pub op_name: String,
    pub op_attrs: Vec<XmlAttr>,
    /// The operation element was empty (`<get/>`).
    pub op_empty: bool,
    pub message_id: Option<MsgId>,
    pub errors: RpcErrorList,
}

impl RpcContext<'_> {
    pub fn find_attr(&self, name: &str) -> Option<&XmlAttr> {
        self.op_attrs.iter().find(|a| a.name == name)
    }

    /// Session's username for access-control decisions.
    pub fn username(&self) -> String {
        self.state
            .sessions
            .get(self.sid)
            .map(|s| s.username().to_string())
            .unwrap_or_default()
    }
}

pub type Handler = fn(&mut RpcContext<'_>) -> Result<RpcOutput, Status>;

/// Build the operation dispatch table for the advertised modules.
pub fn build_op_table(wk: &WellKnown) -> IndexMap<(NsId, String), Handler> {
    let mut table: IndexMap<(NsId, String), Handler> = IndexMap::new();
    let mut add = |ns: NsId, name: &str, h: Handler| {
        table.insert((ns, name.to_string()), h);
    };

    // base operations
    add(wk.nc, "get", get::get);
    add(wk.nc, "get-config", get::get_config);
    add(wk.nc, "edit-config", edit::edit_config);
    add(wk.nc, "copy-config", edit::copy_config);
    add(wk.nc, "delete-config", edit::delete_config);
    add(wk.nc, "lock", locks::lock);
    add(wk.nc, "unlock", locks::unlock);
    add(wk.nc, "close-session", sessions::close_session);
    add(wk.nc, "kill-session", sessions::kill_session);
    add(wk.nc, "commit", commit::commit);
    add(wk.nc, "discard-changes", commit::discard_changes);
    add(wk.nc, "validate", commit::validate);
    add(wk.nc, "cancel-commit", commit::cancel_commit);

    // extension modules, in their own namespaces
    add(wk.ncn, "create-subscription", sessions::create_subscription);
    add(wk.plock, "partial-lock", locks::partial_lock);
    add(wk.plock, "partial-unlock", locks::partial_unlock);
    add(wk.ncm, "get-schema", sessions::get_schema);
    add(wk.ncx, "get-my-session", sessions::get_my_session);
    add(wk.ncx, "set-my-session", sessions::set_my_session);
    table
}

// ---- shared payload parsing ----

/// One parameter element event inside an operation payload.
pub struct ParamEvent {
    pub ns: NsId,
    pub name: String,
    pub attrs: Vec<XmlAttr>,
    pub empty: bool,
}

/// Pull the next child element of the current container, or `None` at
/// its end tag.
pub fn next_param(reader: &mut XmlReader) -> Result<Option<ParamEvent>, Status> {
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Start { ns, name, attrs } => {
                return Ok(Some(ParamEvent { ns, name, attrs, empty: false }))
            }
            XmlEvent::Empty { ns, name, attrs } => {
                return Ok(Some(ParamEvent { ns, name, attrs, empty: true }))
            }
            XmlEvent::End { .. } => return Ok(None),
            XmlEvent::Text(_) => continue,
            XmlEvent::Eof => return Ok(None),
        }
    }
}

/// Collect the text content of the current element up to its end tag.
pub fn read_text(reader: &mut XmlReader) -> Result<String, Status> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Text(t) => out.push_str(&t),
            XmlEvent::Start { .. } => depth += 1,
            XmlEvent::End { .. } => {
                if depth == 0 {
                    return Ok(out.trim().to_string());
                }
                depth -= 1;
            }
            XmlEvent::Empty { .. } => {}
            XmlEvent::Eof => return Ok(out.trim().to_string()),
        }
    }
}

/// Skip the rest of the current element's content.
pub fn skip_param(reader: &mut XmlReader, empty: bool) -> Result<(), Status> {
    if empty {
        return Ok(());
    }
    reader.skip_subtree().map_err(|e| Status::XmlMalformed(e.to_string()))
}

/// Parse `<target>` / `<source>` style containers holding exactly one
/// datastore name element (`<running/>`, `<candidate/>`, `<startup/>`).
pub fn parse_datastore_ref(
    reader: &mut XmlReader,
    container: &str,
    empty: bool,
) -> Result<DatastoreName, Status> {
    if empty {
        return Err(Status::MissingElement(container.to_string()));
    }
    let mut found: Option<DatastoreName> = None;
    while let Some(param) = next_param(reader)? {
        match DatastoreName::parse(&param.name) {
            Some(name) if found.is_none() => {
                found = Some(name);
                skip_param(reader, param.empty)?;
            }
            _ => {
                skip_param(reader, param.empty)?;
                return Err(Status::BadElement(param.name));
            }
        }
    }
    found.ok_or_else(|| Status::MissingElement(container.to_string()))
}

/// Parse an inline `<config>`-style fragment into a schema-annotated
/// tree with per-node edit metadata taken from `operation` and
/// `insert`/`key`/`value` attributes.
pub fn parse_config_fragment(
    reader: &mut XmlReader,
    state: &ServerState,
) -> Result<ValueTree, Status> {
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Start { ns, name, attrs } => {
                parse_config_element(reader, state, &mut tree, root, None, ns, &name, &attrs, false)?;
            }
            XmlEvent::Empty { ns, name, attrs } => {
                parse_config_element(reader, state, &mut tree, root, None, ns, &name, &attrs, true)?;
            }
            XmlEvent::End { .. } | XmlEvent::Eof => break,
            XmlEvent::Text(_) => {}
        }
    }
    Ok(tree)
}

/// Recursive element parser for edit payloads.
#[allow(clippy::too_many_arguments)]
fn parse_config_element(
    reader: &mut XmlReader,
    state: &ServerState,
    tree: &mut ValueTree,
    parent: NodeId,
    parent_schema: Option<SchemaId>,
    ns: NsId,
    name: &str,
    attrs: &[XmlAttr],
    empty: bool,
) -> Result<(), Status> {
    if ns.is_invalid() {
        return Err(Status::UnknownNamespace(name.to_string()));
    }
    let sid = match parent_schema {
        None => state.schema.top(ns, name),
        Some(p) => state.schema.child(p, ns, name),
    };
    let Some(sid) = sid else {
        return Err(Status::UnknownElement(name.to_string()));
    };

    let kind = match state.schema.node(sid).map(|t| &t.kind) {
        Some(SchemaKind::Container { .. }) => ValueKind::Container,
        Some(SchemaKind::List { .. }) => ValueKind::List,
        Some(SchemaKind::Leaf { ty, .. }) if matches!(ty, ncs_core::schema::LeafType::Empty) => {
            ValueKind::Empty
        }
        Some(SchemaKind::Leaf { .. }) => ValueKind::Leaf(String::new()),
        Some(SchemaKind::LeafList { .. }) => ValueKind::LeafList(String::new()),
        Some(SchemaKind::AnyXml) => ValueKind::AnyXml(String::new()),
        Some(SchemaKind::Choice { .. }) | None => ValueKind::Container,
    };

    let mut node = ValueNode::new(ns, name, kind).with_schema(sid);
    node.edit = parse_edit_attrs(attrs, state)?;
    let id = tree.add_child(parent, node);

    if empty {
        return Ok(());
    }

    let mut text = String::new();
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Start { ns: cns, name: cname, attrs: cattrs } => {
                parse_config_element(reader, state, tree, id, Some(sid), cns, &cname, &cattrs, false)?;
            }
            XmlEvent::Empty { ns: cns, name: cname, attrs: cattrs } => {
                parse_config_element(reader, state, tree, id, Some(sid), cns, &cname, &cattrs, true)?;
            }
            XmlEvent::Text(t) => text.push_str(&t),
            XmlEvent::End { .. } => break,
            XmlEvent::Eof => return Err(Status::XmlMalformed("unexpected EOF".into())),
        }
    }

    if let Some(n) = tree.node_mut(id) {
        match &mut n.kind {
            ValueKind::Leaf(v) | ValueKind::LeafList(v) | ValueKind::AnyXml(v) => {
                *v = text.trim().to_string();
            }
            _ => {}
        }
    }
    Ok(())
}

/// `operation`, `insert`, `key` and `value` attributes on edit nodes.
fn parse_edit_attrs(attrs: &[XmlAttr], state: &ServerState) -> Result<Option<EditMeta>, Status> {
    let nc = state.wk.nc;
    let mut meta = EditMeta::default();
    let mut any = false;
    for attr in attrs {
        // operation/insert are qualified with the base namespace; be
        // lenient about unqualified forms some clients send
        let relevant = attr.ns == nc || !attr.is_qualified();
        if !relevant {
            continue;
        }
        match attr.name.as_str() {
            "operation" => {
                let op = EditOp::parse(&attr.value)
                    .ok_or_else(|| Status::BadAttribute("operation".to_string()))?;
                meta.op = Some(op);
                any = true;
            }
            "insert" => {
                any = true;
                meta.insert = Some(match attr.value.as_str() {
                    "first" => InsertPoint::First,
                    "last" => InsertPoint::Last,
                    // the before/after anchor arrives in key/value
                    "before" => InsertPoint::Before(String::new()),
                    "after" => InsertPoint::After(String::new()),
                    _ => return Err(Status::BadAttribute("insert".to_string())),
                });
            }
            _ => {}
        }
    }
    // resolve before/after anchors from key= (lists) or value= (leaf-lists)
    if let Some(anchor) = attrs
        .iter()
        .find(|a| a.name == "key" || a.name == "value")
        .map(|a| anchor_value(&a.value))
    {
        match &mut meta.insert {
            Some(InsertPoint::Before(slot)) | Some(InsertPoint::After(slot)) => {
                *slot = anchor;
            }
            _ => {}
        }
    }
    Ok(any.then_some(meta))
}

/// Reduce a `key` attribute like `[name='fred']` or a raw value to the
/// anchor string the engine positions against.
fn anchor_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.split_once('='))
        .map(|(_, v)| v.trim())
    {
        return inner.trim_matches('\'').trim_matches('"').to_string();
    }
    trimmed.to_string()
}

/// Parse a `<filter>` element into a retrieval filter. The `type`
/// attribute chooses subtree (default) or xpath; xpath filters carry
/// the pre-compiled program on the `select` attribute.
pub fn parse_filter(
    reader: &mut XmlReader,
    attrs: &[XmlAttr],
    empty: bool,
) -> Result<Option<ncs_store::GetFilter>, Status> {
    let ftype = attrs.iter().find(|a| a.name == "type").map(|a| a.value.as_str());
    match ftype {
        Some("xpath") => {
            let select = attrs
                .iter()
                .find(|a| a.name == "select")
                .ok_or_else(|| Status::MissingAttribute("select".to_string()))?;
            let prog = match &select.xpath {
                Some(Ok(prog)) => prog.clone(),
                Some(Err(e)) => return Err(Status::InvalidValue(e.to_string())),
                None => return Err(Status::MissingAttribute("select".to_string())),
            };
            skip_param(reader, empty)?;
            Ok(Some(ncs_store::GetFilter::XPath(prog)))
        }
        Some("subtree") | None => {
            if empty {
                // an empty filter selects nothing
                let (tree, _) = ValueTree::with_root(ValueNode::new(
                    NsId::NONE,
                    "filter",
                    ValueKind::Container,
                ));
                return Ok(Some(ncs_store::GetFilter::Subtree(tree)));
            }
            let tree = parse_filter_tree(reader)?;
            Ok(Some(ncs_store::GetFilter::Subtree(tree)))
        }
        Some(other) => Err(Status::InvalidValue(format!("filter type {other:?}"))),
    }
}

/// Schema-less fragment parser used for filter specs.
fn parse_filter_tree(reader: &mut XmlReader) -> Result<ValueTree, Status> {
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "filter", ValueKind::Container));
    let mut stack: Vec<(NodeId, String)> = Vec::new();
    let mut cur = root;
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Start { ns, name, .. } => {
                let id = tree.add_child(cur, ValueNode::new(ns, &name, ValueKind::Container));
                stack.push((cur, name));
                cur = id;
            }
            XmlEvent::Empty { ns, name, .. } => {
                tree.add_child(cur, ValueNode::new(ns, &name, ValueKind::Leaf(String::new())));
            }
            XmlEvent::Text(t) => {
                if let Some(n) = tree.node_mut(cur) {
                    if n.children.is_empty() {
                        n.kind = ValueKind::Leaf(t.trim().to_string());
                    }
                }
            }
            XmlEvent::End { .. } => match stack.pop() {
                Some((parent, _)) => cur = parent,
                None => break,
            },
            XmlEvent::Eof => break,
        }
    }
    Ok(tree)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One named configuration datastore.
//!
//! Owns a single root value node in an arena tree, a queue of load-time
//! error records, and the global `<lock>` holder. Not readable by
//! clients until its state reaches [`DsState::Ready`].

use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_core::schema::{SchemaId, SchemaKind, SchemaRegistry};
use ncs_core::value::{NodeId, ValueKind, ValueNode, ValueTree};
use ncs_core::xmlns::NsId;
use ncs_wire::reader::{XmlEvent, XmlReader};
use ncs_wire::writer::XmlWriter;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error in {path}: {detail}")]
    Xml { path: String, detail: String },
    #[error("fatal load error at {path}: {status}")]
    LoadFatal { path: String, status: Status },
    #[error("datastore {0} is not ready")]
    NotReady(DatastoreName),
    #[error("datastore {name} locked by session {holder}")]
    Locked { name: DatastoreName, holder: SessionId },
}

/// The datastores a server profile can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatastoreName {
    Running,
    Candidate,
    Startup,
}

impl DatastoreName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatastoreName::Running => "running",
            DatastoreName::Candidate => "candidate",
            DatastoreName::Startup => "startup",
        }
    }

    pub fn parse(s: &str) -> Option<DatastoreName> {
        match s {
            "running" => Some(DatastoreName::Running),
            "candidate" => Some(DatastoreName::Candidate),
            "startup" => Some(DatastoreName::Startup),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatastoreName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datastore lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsState {
    Init,
    Ready,
    Cleanup,
}

/// What to do when a load hits an invalid subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// The offending subtree is pruned and recorded.
    Prune,
    /// Any load error is fatal.
    Fatal,
}

/// One recorded load-time error.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub path: String,
    pub status: Status,
}

#[derive(Debug)]
pub struct Datastore {
    pub name: DatastoreName,
    state: DsState,
    tree: ValueTree,
    root: NodeId,
    load_errors: Vec<LoadError>,
    lock_holder: Option<SessionId>,
}

impl Datastore {
    pub fn new(name: DatastoreName) -> Self {
        let (tree, root) =
            ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
        Self { name, state: DsState::Init, tree, root, load_errors: Vec::new(), lock_holder: None }
    }

    pub fn state(&self) -> DsState {
        self.state
    }

    pub fn set_ready(&mut self) {
        debug!(datastore = %self.name, "datastore ready");
        self.state = DsState::Ready;
    }

    pub fn set_cleanup(&mut self) {
        self.state = DsState::Cleanup;
    }

    pub fn is_ready(&self) -> bool {
        self.state == DsState::Ready
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &ValueTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ValueTree {
        &mut self.tree
    }

    pub fn load_errors(&self) -> &[LoadError] {
        &self.load_errors
    }

    /// Snapshot the whole tree (confirmed commit, copy-config source).
    pub fn snapshot(&self) -> ValueTree {
        self.tree.clone()
    }

    /// Replace the contents with a snapshot taken earlier.
    pub fn restore(&mut self, snapshot: ValueTree) {
        let root = snapshot.root().unwrap_or(self.root);
        self.tree = snapshot;
        self.root = root;
    }

    /// Discard all contents, keeping the synthetic root.
    pub fn clear(&mut self) {
        for child in self.tree.children(self.root).to_vec() {
            self.tree.free_subtree(child);
        }
    }

    /// Replace contents with a deep copy of another datastore.
    pub fn copy_from(&mut self, other: &Datastore) {
        self.clear();
        for child in other.tree.children(other.root).to_vec() {
            self.tree.copy_subtree_from(&other.tree, child, Some(self.root));
        }
    }

    // ---- global <lock> ----

    pub fn lock_holder(&self) -> Option<SessionId> {
        self.lock_holder
    }

    pub fn lock(&mut self, sid: SessionId) -> Result<(), StoreError> {
        match self.lock_holder {
            Some(holder) if holder != sid => {
                Err(StoreError::Locked { name: self.name, holder })
            }
            _ => {
                self.lock_holder = Some(sid);
                info!(datastore = %self.name, session = %sid, "locked");
                Ok(())
            }
        }
    }

    pub fn unlock(&mut self, sid: SessionId) -> Result<(), StoreError> {
        match self.lock_holder {
            Some(holder) if holder == sid => {
                self.lock_holder = None;
                info!(datastore = %self.name, session = %sid, "unlocked");
                Ok(())
            }
            Some(holder) => Err(StoreError::Locked { name: self.name, holder }),
            None => Err(StoreError::Locked { name: self.name, holder: SessionId::INTERNAL }),
        }
    }

    /// Drop the lock when the owning session dies.
    pub fn release_lock_for(&mut self, sid: SessionId) {
        if self.lock_holder == Some(sid) {
            self.lock_holder = None;
        }
    }

    // ---- load / save ----

    /// Load from an XML snapshot file.
    pub fn load_from_file(
        &mut self,
        path: &Path,
        schema: &SchemaRegistry,
        lookup: impl Fn(&str) -> NsId + Send + Clone + 'static,
        policy: LoadPolicy,
    ) -> Result<(), StoreError> {
        let bytes = fs::read(path).map_err(StoreError::Io)?;
        info!(datastore = %self.name, path = %path.display(), "loading snapshot");
        self.load_from_xml(bytes, schema, lookup, policy)
    }

    /// Load from serialized XML. Errors accumulate on the per-datastore
    /// queue; under [`LoadPolicy::Prune`] offending subtrees are skipped.
    pub fn load_from_xml(
        &mut self,
        bytes: Vec<u8>,
        schema: &SchemaRegistry,
        lookup: impl Fn(&str) -> NsId + Send + Clone + 'static,
        policy: LoadPolicy,
    ) -> Result<(), StoreError> {
        self.clear();
        let mut reader = XmlReader::new(bytes, lookup);
        // accept an optional <config> wrapper around the top-level nodes
        let mut wrapper_depth = 0usize;
        loop {
            let ev = reader.next_event().map_err(|e| StoreError::Xml {
                path: "/".to_string(),
                detail: e.to_string(),
            })?;
            match ev {
                XmlEvent::Start { ns, name, .. } => {
                    if wrapper_depth == 0 && name == "config" {
                        wrapper_depth = reader.depth();
                        continue;
                    }
                    let parent = self.root;
                    self.parse_element(&mut reader, parent, None, ns, &name, false, schema, policy)?;
                }
                XmlEvent::Empty { ns, name, .. } => {
                    if wrapper_depth == 0 && name == "config" {
                        break;
                    }
                    let parent = self.root;
                    self.parse_element(&mut reader, parent, None, ns, &name, true, schema, policy)?;
                }
                XmlEvent::End { .. } => {
                    if wrapper_depth > 0 && reader.depth() < wrapper_depth {
                        break;
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => break,
            }
        }
        if !self.load_errors.is_empty() {
            warn!(
                datastore = %self.name,
                errors = self.load_errors.len(),
                "snapshot loaded with pruned subtrees"
            );
        }
        Ok(())
    }

    /// Parse one element (already consumed as Start/Empty) into the tree.
    #[allow(clippy::too_many_arguments)]
    fn parse_element(
        &mut self,
        reader: &mut XmlReader,
        parent: NodeId,
        parent_schema: Option<SchemaId>,
        ns: NsId,
        name: &str,
        empty: bool,
        schema: &SchemaRegistry,
        policy: LoadPolicy,
    ) -> Result<(), StoreError> {
        let sid = match parent_schema {
            None => schema.top(ns, name),
            Some(p) => schema.child(p, ns, name),
        };
        let Some(sid) = sid else {
            let status = Status::UnknownElement(name.to_string());
            let path = format!("/{name}");
            if policy == LoadPolicy::Fatal {
                return Err(StoreError::LoadFatal { path, status });
            }
            self.load_errors.push(LoadError { path, status });
            if !empty {
                reader.skip_subtree().map_err(|e| StoreError::Xml {
                    path: format!("/{name}"),
                    detail: e.to_string(),
                })?;
            }
            return Ok(());
        };

        let template = schema.node(sid);
        let kind = match template.map(|t| &t.kind) {
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
        let node = ValueNode::new(ns, name, kind).with_schema(sid);
        let id = self.tree.add_child(parent, node);

        if empty {
            return Ok(());
        }

        // consume children until this element's end tag
        let mut text = String::new();
        loop {
            let ev = reader.next_event().map_err(|e| StoreError::Xml {
                path: format!("/{name}"),
                detail: e.to_string(),
            })?;
            match ev {
                XmlEvent::Start { ns: cns, name: cname, .. } => {
                    self.parse_element(reader, id, Some(sid), cns, &cname, false, schema, policy)?;
                }
                XmlEvent::Empty { ns: cns, name: cname, .. } => {
                    self.parse_element(reader, id, Some(sid), cns, &cname, true, schema, policy)?;
                }
                XmlEvent::Text(t) => text.push_str(&t),
                XmlEvent::End { .. } => break,
                XmlEvent::Eof => {
                    return Err(StoreError::Xml {
                        path: format!("/{name}"),
                        detail: "unexpected end of document".to_string(),
                    })
                }
            }
        }

        if let Some(node) = self.tree.node_mut(id) {
            match &mut node.kind {
                ValueKind::Leaf(v) | ValueKind::LeafList(v) | ValueKind::AnyXml(v) => {
                    *v = text.trim().to_string();
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Serialize and atomically save: write a temp file in the target
    /// directory, then rename over the snapshot.
    pub fn save_to_file(
        &self,
        path: &Path,
        reg: &ncs_core::xmlns::NsRegistry,
    ) -> Result<(), StoreError> {
        let xml = self.serialize(reg);
        let tmp = temp_path(path);
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(xml.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        info!(datastore = %self.name, path = %path.display(), "snapshot saved");
        Ok(())
    }

    pub fn serialize(&self, reg: &ncs_core::xmlns::NsRegistry) -> String {
        let mut w = XmlWriter::new(reg);
        w.start_element(NsId::NONE, "config");
        for child in self.tree.children(self.root).to_vec() {
            w.value_subtree(&self.tree, child);
        }
        w.end_element();
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&w.finish());
        out.push('\n');
        out
    }

    // ---- tree maintenance passes ----

    /// Add missing leaves that carry schema defaults. Returns how many
    /// nodes were created.
    pub fn default_fill(&mut self, schema: &SchemaRegistry) -> usize {
        let root = self.root;
        self.default_fill_under(root, None, schema)
    }

    fn default_fill_under(
        &mut self,
        id: NodeId,
        sid: Option<SchemaId>,
        schema: &SchemaRegistry,
    ) -> usize {
        let mut added = 0;
        // recurse into existing children first
        for child in self.tree.children(id).to_vec() {
            let child_sid = self.tree.node(child).and_then(|n| n.schema);
            added += self.default_fill_under(child, child_sid, schema);
        }
        let Some(sid) = sid else { return added };
        let Some(template) = schema.node(sid) else { return added };
        if !matches!(template.kind, SchemaKind::Container { .. } | SchemaKind::List { .. }) {
            return added;
        }
        for child_sid in template.children.clone() {
            let Some(child_t) = schema.node(child_sid) else { continue };
            let Some(default) = child_t.default_value() else { continue };
            if self.tree.find_child(id, child_t.ns, &child_t.name).is_some() {
                continue;
            }
            let mut node =
                ValueNode::new(child_t.ns, child_t.name.clone(), ValueKind::Leaf(default.to_string()))
                    .with_schema(child_sid);
            node.from_default = true;
            self.tree.add_child(id, node);
            added += 1;
        }
        added
    }

    /// Remove empty non-presence containers bottom-up. Always on: the
    /// path expressions used by locks and filters rely on it.
    pub fn prune_empty_containers(&mut self, schema: &SchemaRegistry) -> usize {
        let root = self.root;
        self.prune_under(root, schema)
    }

    fn prune_under(&mut self, id: NodeId, schema: &SchemaRegistry) -> usize {
        let mut pruned = 0;
        for child in self.tree.children(id).to_vec() {
            pruned += self.prune_under(child, schema);
        }
        let Some(node) = self.tree.node(id) else { return pruned };
        if node.parent.is_none() || !node.children.is_empty() {
            return pruned;
        }
        let is_np_container = node
            .schema
            .and_then(|sid| schema.node(sid))
            .is_some_and(|t| matches!(t.kind, SchemaKind::Container { presence: false }));
        if is_np_container {
            self.tree.free_subtree(id);
            pruned += 1;
        }
        pruned
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "datastore_tests.rs"]
mod tests;

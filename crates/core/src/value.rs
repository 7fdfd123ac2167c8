// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arena-owned configuration value tree.
//!
//! Nodes are addressed by [`NodeId`] handles into a slab; parents are
//! reached by index, never by pointer, so back-references are safe and
//! subtrees can move between trees (edit staging, commit, snapshot)
//! without touching the nodes themselves.
//!
//! Lifecycle: nodes are created by a parser (load or edit), owned by a
//! transaction while staged, moved into the datastore on commit, and
//! freed on commit of a delete or datastore teardown.

use crate::schema::SchemaId;
use crate::xmlns::NsId;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Handle of one node in a [`ValueTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Per-node edit operation from `<edit-config>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

impl EditOp {
    pub fn parse(s: &str) -> Option<EditOp> {
        match s {
            "merge" => Some(EditOp::Merge),
            "replace" => Some(EditOp::Replace),
            "create" => Some(EditOp::Create),
            "delete" => Some(EditOp::Delete),
            "remove" => Some(EditOp::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditOp::Merge => "merge",
            EditOp::Replace => "replace",
            EditOp::Create => "create",
            EditOp::Delete => "delete",
            EditOp::Remove => "remove",
        }
    }
}

/// `insert` attribute for user-ordered lists and leaf-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPoint {
    First,
    Last,
    /// Before the sibling identified by the resolved `key`/`value` attr.
    Before(String),
    After(String),
}

/// Edit metadata attached to a node while a transaction owns it.
#[derive(Debug, Clone, Default)]
pub struct EditMeta {
    pub op: Option<EditOp>,
    pub insert: Option<InsertPoint>,
}

/// Raw XML attribute recorded on a value node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttrMeta {
    pub ns: NsId,
    pub name: String,
    pub value: String,
}

/// Node payload, tagged by value kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Container,
    List,
    Leaf(String),
    LeafList(String),
    /// Transient while an edit names a choice explicitly; data trees
    /// inline the chosen case.
    Choice,
    Empty,
    AnyXml(String),
}

impl ValueKind {
    pub fn is_leafy(&self) -> bool {
        matches!(self, ValueKind::Leaf(_) | ValueKind::LeafList(_) | ValueKind::Empty)
    }

    pub fn leaf_value(&self) -> Option<&str> {
        match self {
            ValueKind::Leaf(v) | ValueKind::LeafList(v) => Some(v),
            ValueKind::Empty => Some(""),
            _ => None,
        }
    }
}

/// One tree node: the shared envelope plus the kind payload.
#[derive(Debug, Clone)]
pub struct ValueNode {
    pub schema: Option<SchemaId>,
    pub ns: NsId,
    pub name: String,
    pub kind: ValueKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attrs: Vec<XmlAttrMeta>,
    pub edit: Option<EditMeta>,
    /// Set when default-fill materialized this node.
    pub from_default: bool,
}

impl ValueNode {
    pub fn new(ns: NsId, name: impl Into<String>, kind: ValueKind) -> ValueNode {
        ValueNode {
            schema: None,
            ns,
            name: name.into(),
            kind,
            parent: None,
            children: Vec::new(),
            attrs: Vec::new(),
            edit: None,
            from_default: false,
        }
    }

    pub fn with_schema(mut self, schema: SchemaId) -> ValueNode {
        self.schema = Some(schema);
        self
    }

    pub fn leaf_value(&self) -> Option<&str> {
        self.kind.leaf_value()
    }
}

/// Slab arena of value nodes with a free list.
#[derive(Debug, Clone, Default)]
pub struct ValueTree {
    slots: Vec<Option<ValueNode>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
}

impl ValueTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with a fresh root node.
    pub fn with_root(node: ValueNode) -> (ValueTree, NodeId) {
        let mut tree = ValueTree::new();
        let root = tree.alloc(node);
        tree.root = Some(root);
        (tree, root)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn alloc(&mut self, node: ValueNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id.0 as usize] = Some(node);
            id
        } else {
            let id = NodeId(self.slots.len() as u32);
            self.slots.push(Some(node));
            id
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&ValueNode> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ValueNode> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// Attach `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: ValueNode) -> NodeId {
        let id = self.alloc(node);
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        id
    }

    /// Attach `node` at a specific child index of `parent`.
    pub fn insert_child_at(&mut self, parent: NodeId, index: usize, node: ValueNode) -> NodeId {
        let id = self.alloc(node);
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, id);
        }
        id
    }

    /// Unlink `id` from its parent without freeing it.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(pid) = parent {
            if let Some(p) = self.node_mut(pid) {
                p.children.retain(|c| *c != id);
            }
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }

    /// Free `id` and every descendant.
    pub fn free_subtree(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.slots.get_mut(cur.0 as usize).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(cur);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// First child of `parent` with the given qualified name. A zero
    /// namespace matches any.
    pub fn find_child(&self, parent: NodeId, ns: NsId, name: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|c| {
            self.node(*c).is_some_and(|n| n.name == name && (ns.is_none() || n.ns == ns))
        })
    }

    /// All children of `parent` with the given qualified name.
    pub fn find_children(&self, parent: NodeId, ns: NsId, name: &str) -> Vec<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .filter(|c| {
                self.node(*c).is_some_and(|n| n.name == name && (ns.is_none() || n.ns == ns))
            })
            .collect()
    }

    /// Find the list entry whose key leaves all match.
    pub fn find_list_entry(
        &self,
        parent: NodeId,
        ns: NsId,
        name: &str,
        keys: &[(String, String)],
    ) -> Option<NodeId> {
        self.find_children(parent, ns, name).into_iter().find(|entry| {
            keys.iter().all(|(k, v)| {
                self.find_child(*entry, NsId::NONE, k)
                    .and_then(|kid| self.node(kid))
                    .and_then(|n| n.leaf_value())
                    .is_some_and(|val| val == v)
            })
        })
    }

    /// Leaf string value of a direct child, if present.
    pub fn child_leaf_value(&self, parent: NodeId, name: &str) -> Option<&str> {
        let id = self.find_child(parent, NsId::NONE, name)?;
        self.node(id)?.leaf_value()
    }

    /// XPath-style path from the root to `id`, with key predicates on
    /// list entries: `/system/user[name='fred']/shell`.
    pub fn path(&self, id: NodeId, key_names: impl Fn(NodeId) -> Vec<String>) -> String {
        let mut segments = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(node) = self.node(c) else { break };
            // the synthetic root container is not part of the path
            if node.parent.is_none() {
                break;
            }
            let mut seg = node.name.clone();
            for key in key_names(c) {
                if let Some(v) = self.child_leaf_value(c, &key) {
                    let _ = write!(seg, "[{}='{}']", key, v);
                }
            }
            segments.push(seg);
            cur = node.parent;
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for seg in segments.iter().rev() {
            out.push('/');
            out.push_str(seg);
        }
        out
    }

    /// Deep-copy the subtree rooted at `src_id` in `src` into this tree
    /// under `parent` (append position). Edit metadata is not copied.
    pub fn copy_subtree_from(
        &mut self,
        src: &ValueTree,
        src_id: NodeId,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        let src_node = src.node(src_id)?;
        let mut copy = src_node.clone();
        copy.children = Vec::new();
        copy.parent = parent;
        copy.edit = None;
        let new_id = match parent {
            Some(p) => self.add_child(p, copy),
            None => self.alloc(copy),
        };
        for child in src.children(src_id).to_vec() {
            self.copy_subtree_from(src, child, Some(new_id));
        }
        Some(new_id)
    }

    /// Count of live nodes.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Canonical equality of two subtrees: names, namespaces, kinds and
    /// leaf values must match; child order is ignored for containers and
    /// keyed lists but significant for leaf-lists.
    pub fn subtree_equal(&self, a: NodeId, other: &ValueTree, b: NodeId) -> bool {
        let (Some(na), Some(nb)) = (self.node(a), other.node(b)) else {
            return false;
        };
        if na.ns != nb.ns || na.name != nb.name {
            return false;
        }
        match (&na.kind, &nb.kind) {
            (ValueKind::Leaf(x), ValueKind::Leaf(y)) => return x == y,
            (ValueKind::Empty, ValueKind::Empty) => return true,
            (ValueKind::AnyXml(x), ValueKind::AnyXml(y)) => return x == y,
            (ValueKind::LeafList(x), ValueKind::LeafList(y)) => return x == y,
            (ValueKind::Container, ValueKind::Container)
            | (ValueKind::List, ValueKind::List)
            | (ValueKind::Choice, ValueKind::Choice) => {}
            _ => return false,
        }
        let ca = self.children(a);
        let cb = other.children(b);
        if ca.len() != cb.len() {
            return false;
        }
        // match children as an unordered set; each b-child claimed once
        let mut claimed = vec![false; cb.len()];
        for child_a in ca {
            let mut found = false;
            for (i, child_b) in cb.iter().enumerate() {
                if !claimed[i] && self.subtree_equal(*child_a, other, *child_b) {
                    claimed[i] = true;
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema object templates.
//!
//! The YANG compiler is an external collaborator; this module holds the
//! compiled form it would hand over. Built-in modules register their
//! templates programmatically at server init. Templates are immutable
//! once registered and addressed by [`SchemaId`] handles; top-level
//! objects are also reachable by `(NsId, name)` for dispatch.

use crate::xmlns::NsId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Handle of one schema object template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

/// Leaf value type, reduced to the set the server validates itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafType {
    String,
    Uint32,
    Int64,
    Boolean,
    Enumeration(Vec<String>),
    /// Presence-only leaf.
    Empty,
    /// Reference to another leaf by absolute path.
    Leafref(String),
}

impl LeafType {
    /// Check a canonical string value against this type.
    pub fn check(&self, value: &str) -> bool {
        match self {
            LeafType::String => true,
            LeafType::Uint32 => value.parse::<u32>().is_ok(),
            LeafType::Int64 => value.parse::<i64>().is_ok(),
            LeafType::Boolean => matches!(value, "true" | "false"),
            LeafType::Enumeration(names) => names.iter().any(|n| n == value),
            LeafType::Empty => value.is_empty(),
            LeafType::Leafref(_) => true,
        }
    }
}

/// Node-kind specific template payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    Container {
        /// Presence containers carry meaning when empty; non-presence
        /// containers are pruned when they have no children.
        presence: bool,
    },
    List {
        /// Key leaf names, in key order.
        keys: Vec<String>,
        /// `unique` constraints: each entry is a set of leaf names.
        unique: Vec<Vec<String>>,
        min_elements: u32,
        max_elements: Option<u32>,
        /// `ordered-by user` lists honor the `insert` attribute.
        user_ordered: bool,
    },
    Leaf {
        ty: LeafType,
        default: Option<String>,
    },
    LeafList {
        ty: LeafType,
        min_elements: u32,
        max_elements: Option<u32>,
        user_ordered: bool,
    },
    Choice {
        /// Case names; children carry their case in `case_name`.
        cases: Vec<String>,
    },
    AnyXml,
}

/// One schema object template.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub id: SchemaId,
    pub ns: NsId,
    pub name: String,
    pub kind: SchemaKind,
    pub parent: Option<SchemaId>,
    pub children: Vec<SchemaId>,
    /// False for read-only state data (e.g. netconf-state counters).
    pub config: bool,
    pub mandatory: bool,
    /// Case this node belongs to, when the parent is a choice.
    pub case_name: Option<String>,
    /// `when` guard expression, evaluated against the parent context.
    pub when: Option<String>,
    /// `must` constraints, evaluated against the node itself.
    pub must: Vec<String>,
}

impl SchemaNode {
    pub fn is_leafy(&self) -> bool {
        matches!(self.kind, SchemaKind::Leaf { .. } | SchemaKind::LeafList { .. })
    }

    pub fn list_keys(&self) -> &[String] {
        match &self.kind {
            SchemaKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Leaf { default, .. } => default.as_deref(),
            _ => None,
        }
    }
}

/// Module metadata for `<get-schema>` and capability advertisement.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub ns: NsId,
    pub prefix: String,
    pub revision: Option<String>,
}

/// Registry of all compiled schema templates.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    nodes: Vec<SchemaNode>,
    top: IndexMap<(NsId, String), SchemaId>,
    modules: Vec<ModuleInfo>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, info: ModuleInfo) {
        self.modules.push(info);
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn module_by_name(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Register a template. Top-level objects (no parent) become
    /// dispatchable by `(ns, name)`.
    pub fn register(&mut self, mut node: SchemaNode) -> SchemaId {
        let id = SchemaId(self.nodes.len() as u32);
        node.id = id;
        if let Some(parent) = node.parent {
            if let Some(p) = self.nodes.get_mut(parent.0 as usize) {
                p.children.push(id);
            }
        } else {
            self.top.insert((node.ns, node.name.clone()), id);
        }
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: SchemaId) -> Option<&SchemaNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Find a top-level template by qualified name.
    pub fn top(&self, ns: NsId, name: &str) -> Option<SchemaId> {
        self.top.get(&(ns, name.to_string())).copied()
    }

    pub fn top_ids(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.top.values().copied()
    }

    /// Find a child template under `parent` by qualified name. A child
    /// with no namespace match falls back to name-only match within the
    /// parent's namespace.
    pub fn child(&self, parent: SchemaId, ns: NsId, name: &str) -> Option<SchemaId> {
        let p = self.node(parent)?;
        for cid in &p.children {
            let c = self.node(*cid)?;
            if c.name == name && (c.ns == ns || ns.is_none()) {
                return Some(*cid);
            }
            // step through choices transparently
            if matches!(c.kind, SchemaKind::Choice { .. }) {
                if let Some(found) = self.child(*cid, ns, name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// True when `leaf_name` is a key of the list template `list`.
    pub fn is_list_key(&self, list: SchemaId, leaf_name: &str) -> bool {
        self.node(list).is_some_and(|n| n.list_keys().iter().any(|k| k == leaf_name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Convenience builder used by the built-in modules.
pub struct ModuleBuilder<'a> {
    reg: &'a mut SchemaRegistry,
    ns: NsId,
}

impl<'a> ModuleBuilder<'a> {
    pub fn new(reg: &'a mut SchemaRegistry, ns: NsId, info: ModuleInfo) -> Self {
        reg.add_module(info);
        Self { reg, ns }
    }

    fn base(&self, name: &str, parent: Option<SchemaId>, kind: SchemaKind) -> SchemaNode {
        SchemaNode {
            id: SchemaId(0),
            ns: self.ns,
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            config: true,
            mandatory: false,
            case_name: None,
            when: None,
            must: Vec::new(),
        }
    }

    pub fn container(&mut self, parent: Option<SchemaId>, name: &str, presence: bool) -> SchemaId {
        let node = self.base(name, parent, SchemaKind::Container { presence });
        self.reg.register(node)
    }

    pub fn state_container(&mut self, parent: Option<SchemaId>, name: &str) -> SchemaId {
        let mut node = self.base(name, parent, SchemaKind::Container { presence: false });
        node.config = false;
        self.reg.register(node)
    }

    pub fn list(&mut self, parent: Option<SchemaId>, name: &str, keys: &[&str]) -> SchemaId {
        let node = self.base(
            name,
            parent,
            SchemaKind::List {
                keys: keys.iter().map(|k| k.to_string()).collect(),
                unique: Vec::new(),
                min_elements: 0,
                max_elements: None,
                user_ordered: false,
            },
        );
        self.reg.register(node)
    }

    pub fn leaf(&mut self, parent: Option<SchemaId>, name: &str, ty: LeafType) -> SchemaId {
        let node = self.base(name, parent, SchemaKind::Leaf { ty, default: None });
        self.reg.register(node)
    }

    pub fn mandatory_leaf(&mut self, parent: Option<SchemaId>, name: &str, ty: LeafType) -> SchemaId {
        let mut node = self.base(name, parent, SchemaKind::Leaf { ty, default: None });
        node.mandatory = true;
        self.reg.register(node)
    }

    pub fn leaf_with_default(
        &mut self,
        parent: Option<SchemaId>,
        name: &str,
        ty: LeafType,
        default: &str,
    ) -> SchemaId {
        let node = self.base(
            name,
            parent,
            SchemaKind::Leaf { ty, default: Some(default.to_string()) },
        );
        self.reg.register(node)
    }

    pub fn leaf_list(&mut self, parent: Option<SchemaId>, name: &str, ty: LeafType) -> SchemaId {
        let node = self.base(
            name,
            parent,
            SchemaKind::LeafList { ty, min_elements: 0, max_elements: None, user_ordered: false },
        );
        self.reg.register(node)
    }

    /// Register with full control over the template fields.
    pub fn custom(&mut self, node: SchemaNode) -> SchemaId {
        self.reg.register(node)
    }

    pub fn ns(&self) -> NsId {
        self.ns
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

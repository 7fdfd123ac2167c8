// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! XML output with per-message prefix assignment.
//!
//! Generated documents declare each namespace at its first use. The
//! prefix map prefers the canonical prefix the module registered; on a
//! collision it falls back to generated `ns1`, `ns2`, ... names so
//! prefixes stay unique within one message.

use ncs_core::value::{NodeId, ValueKind, ValueTree};
use ncs_core::xmlns::{NsId, NsRegistry};

/// Per-message prefix assignments.
#[derive(Debug, Default)]
pub struct PrefixMap {
    assigned: Vec<(NsId, String)>,
    counter: u32,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for `ns`, assigning one on first use. Returns `None` for
    /// the no-namespace id.
    pub fn assign(&mut self, ns: NsId, reg: &NsRegistry) -> Option<&str> {
        if ns.is_none() {
            return None;
        }
        if let Some(idx) = self.assigned.iter().position(|(n, _)| *n == ns) {
            return Some(&self.assigned[idx].1);
        }
        let preferred = reg.prefix(ns).unwrap_or("ns");
        let mut candidate = preferred.to_string();
        while self.assigned.iter().any(|(_, p)| *p == candidate) {
            self.counter += 1;
            candidate = format!("ns{}", self.counter);
        }
        self.assigned.push((ns, candidate));
        Some(&self.assigned[self.assigned.len() - 1].1)
    }

    pub fn lookup(&self, ns: NsId) -> Option<&str> {
        self.assigned.iter().find(|(n, _)| *n == ns).map(|(_, p)| p.as_str())
    }
}

/// Escape a text node or attribute value.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Streaming XML writer with an open-tag buffer so attributes can be
/// added after `start_element`.
pub struct XmlWriter<'r> {
    reg: &'r NsRegistry,
    out: String,
    prefixes: PrefixMap,
    declared: Vec<NsId>,
    stack: Vec<String>,
    tag_open: bool,
}

impl<'r> XmlWriter<'r> {
    pub fn new(reg: &'r NsRegistry) -> Self {
        Self {
            reg,
            out: String::new(),
            prefixes: PrefixMap::new(),
            declared: Vec::new(),
            stack: Vec::new(),
            tag_open: false,
        }
    }

    fn close_open_tag(&mut self) {
        if self.tag_open {
            self.out.push('>');
            self.tag_open = false;
        }
    }

    fn qname(&mut self, ns: NsId, name: &str) -> (String, Option<(String, String)>) {
        if ns.is_none() || ns.is_invalid() {
            return (name.to_string(), None);
        }
        let needs_decl = !self.declared.contains(&ns);
        let prefix = self.prefixes.assign(ns, self.reg).map(str::to_string);
        let Some(prefix) = prefix else {
            return (name.to_string(), None);
        };
        let decl = if needs_decl {
            self.declared.push(ns);
            self.reg.uri(ns).map(|uri| (prefix.clone(), uri.to_string()))
        } else {
            None
        };
        (format!("{prefix}:{name}"), decl)
    }

    pub fn start_element(&mut self, ns: NsId, name: &str) {
        self.close_open_tag();
        let (qname, decl) = self.qname(ns, name);
        self.out.push('<');
        self.out.push_str(&qname);
        if let Some((prefix, uri)) = decl {
            self.out.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape(&uri)));
        }
        self.stack.push(qname);
        self.tag_open = true;
    }

    pub fn attr(&mut self, name: &str, value: &str) {
        debug_assert!(self.tag_open);
        self.out.push_str(&format!(" {name}=\"{}\"", escape(value)));
    }

    /// Qualified attribute; declares the namespace if needed.
    pub fn attr_ns(&mut self, ns: NsId, name: &str, value: &str) {
        debug_assert!(self.tag_open);
        let (qname, decl) = self.qname(ns, name);
        if let Some((prefix, uri)) = decl {
            self.out.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape(&uri)));
        }
        self.out.push_str(&format!(" {qname}=\"{}\"", escape(value)));
    }

    pub fn text(&mut self, value: &str) {
        self.close_open_tag();
        self.out.push_str(&escape(value));
    }

    /// Raw pre-serialized XML content (already escaped).
    pub fn raw(&mut self, xml: &str) {
        self.close_open_tag();
        self.out.push_str(xml);
    }

    pub fn end_element(&mut self) {
        let Some(qname) = self.stack.pop() else { return };
        if self.tag_open {
            self.out.push_str("/>");
            self.tag_open = false;
        } else {
            self.out.push_str(&format!("</{qname}>"));
        }
    }

    pub fn leaf_element(&mut self, ns: NsId, name: &str, value: &str) {
        self.start_element(ns, name);
        if !value.is_empty() {
            self.text(value);
        }
        self.end_element();
    }

    /// Serialize a value subtree rooted at `id`, including recorded
    /// XML attribute metadata (e.g. with-defaults tagging).
    pub fn value_subtree(&mut self, tree: &ValueTree, id: NodeId) {
        let Some(node) = tree.node(id) else { return };
        let (ns, name) = (node.ns, node.name.clone());
        let attrs = node.attrs.clone();
        self.start_element(ns, &name);
        for attr in &attrs {
            self.attr_ns(attr.ns, &attr.name, &attr.value);
        }
        match &node.kind {
            ValueKind::Leaf(v) | ValueKind::LeafList(v) => {
                if !v.is_empty() {
                    let v = v.clone();
                    self.text(&v);
                }
            }
            ValueKind::Empty => {}
            ValueKind::AnyXml(raw) => {
                let raw = raw.clone();
                self.raw(&raw);
            }
            ValueKind::Container | ValueKind::List | ValueKind::Choice => {
                for child in tree.children(id).to_vec() {
                    self.value_subtree(tree, child);
                }
            }
        }
        self.end_element();
    }

    pub fn finish(mut self) -> String {
        self.close_open_tag();
        self.out
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;

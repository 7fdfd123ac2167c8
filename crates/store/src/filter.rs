// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrieval filtering for `<get>` / `<get-config>`.
//!
//! Supports NETCONF subtree filtering (selection, containment and
//! content-match nodes) and XPath filters, plus the four with-defaults
//! reporting modes. Access-control read decisions are applied through a
//! caller-supplied predicate so denied subtrees never reach the reply.

use ncs_core::value::{NodeId, ValueKind, ValueNode, ValueTree};
use ncs_core::xmlns::NsId;
use ncs_core::xpath::XPathProgram;
use ncs_core::schema::{SchemaKind, SchemaRegistry};

/// `with-defaults` reporting modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithDefaults {
    ReportAll,
    ReportAllTagged,
    Trim,
    Explicit,
}

impl WithDefaults {
    pub fn parse(s: &str) -> Option<WithDefaults> {
        match s {
            "report-all" => Some(WithDefaults::ReportAll),
            "report-all-tagged" => Some(WithDefaults::ReportAllTagged),
            "trim" => Some(WithDefaults::Trim),
            "explicit" => Some(WithDefaults::Explicit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithDefaults::ReportAll => "report-all",
            WithDefaults::ReportAllTagged => "report-all-tagged",
            WithDefaults::Trim => "trim",
            WithDefaults::Explicit => "explicit",
        }
    }
}

/// A parsed retrieval filter.
#[derive(Debug)]
pub enum GetFilter {
    /// Fragment tree whose root's children are the filter spec.
    Subtree(ValueTree),
    XPath(XPathProgram),
}

/// Read-permission predicate over source nodes.
pub type ReadPredicate<'a> = dyn Fn(&ValueTree, NodeId) -> bool + 'a;

/// Produce the filtered result tree. The returned tree's root is a
/// synthetic container whose children are the selected top-level nodes.
pub fn apply(
    src: &ValueTree,
    src_root: NodeId,
    filter: Option<&GetFilter>,
    read_ok: &ReadPredicate<'_>,
    schema: &SchemaRegistry,
) -> (ValueTree, NodeId) {
    let (mut out, out_root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "data", ValueKind::Container));
    match filter {
        None => {
            for child in src.children(src_root) {
                copy_allowed(src, *child, &mut out, out_root, read_ok);
            }
        }
        Some(GetFilter::Subtree(ftree)) => {
            if let Some(froot) = ftree.root() {
                for fchild in ftree.children(froot) {
                    for dchild in src.children(src_root) {
                        subtree_filter(src, *dchild, ftree, *fchild, &mut out, out_root, read_ok, schema);
                    }
                }
            }
        }
        Some(GetFilter::XPath(prog)) => {
            let hits = prog.eval(src, src_root);
            let mut mapping: Vec<(NodeId, NodeId)> = vec![(src_root, out_root)];
            for hit in hits {
                if !read_ok(src, hit) {
                    continue;
                }
                let parent_out = ensure_ancestors(src, hit, &mut out, &mut mapping, schema);
                copy_allowed(src, hit, &mut out, parent_out, read_ok);
            }
        }
    }
    (out, out_root)
}

/// Deep-copy `id` under `parent`, skipping read-denied descendants.
fn copy_allowed(
    src: &ValueTree,
    id: NodeId,
    out: &mut ValueTree,
    parent: NodeId,
    read_ok: &ReadPredicate<'_>,
) -> Option<NodeId> {
    if !read_ok(src, id) {
        return None;
    }
    let node = src.node(id)?;
    let mut copy = node.clone();
    copy.children = Vec::new();
    copy.edit = None;
    let new_id = out.add_child(parent, copy);
    for child in src.children(id).to_vec() {
        copy_allowed(src, child, out, new_id, read_ok);
    }
    Some(new_id)
}

/// Names and namespaces match; a filter node with no namespace matches
/// any data namespace.
fn name_matches(ftree: &ValueTree, f: NodeId, src: &ValueTree, d: NodeId) -> bool {
    let (Some(fnode), Some(dnode)) = (ftree.node(f), src.node(d)) else {
        return false;
    };
    if fnode.name != dnode.name {
        return false;
    }
    fnode.ns.is_none() || fnode.ns.is_invalid() || fnode.ns == dnode.ns
}

/// RFC 6241 §6 subtree filtering for one (data, filter) node pair.
#[allow(clippy::too_many_arguments)]
fn subtree_filter(
    src: &ValueTree,
    d: NodeId,
    ftree: &ValueTree,
    f: NodeId,
    out: &mut ValueTree,
    out_parent: NodeId,
    read_ok: &ReadPredicate<'_>,
    schema: &SchemaRegistry,
) -> bool {
    if !name_matches(ftree, f, src, d) || !read_ok(src, d) {
        return false;
    }
    let fchildren = ftree.children(f);

    // no children in the filter: selection node, whole subtree
    if fchildren.is_empty() {
        let is_content_match = ftree.node(f).and_then(|n| n.leaf_value()).is_some_and(|v| !v.is_empty());
        if is_content_match {
            // leaf content match: include only when the value agrees
            let matches = src.node(d).and_then(|n| n.leaf_value())
                == ftree.node(f).and_then(|n| n.leaf_value());
            if matches {
                copy_allowed(src, d, out, out_parent, read_ok);
            }
            return matches;
        }
        copy_allowed(src, d, out, out_parent, read_ok);
        return true;
    }

    // partition filter children
    let mut content_matches = Vec::new();
    let mut others = Vec::new();
    for fc in fchildren {
        let leafish = ftree
            .node(*fc)
            .and_then(|n| n.leaf_value())
            .is_some_and(|v| !v.is_empty());
        if leafish && ftree.children(*fc).is_empty() {
            content_matches.push(*fc);
        } else {
            others.push(*fc);
        }
    }

    // every content-match must agree with a data child
    for cm in &content_matches {
        let Some(cmn) = ftree.node(*cm) else { return false };
        let want = cmn.leaf_value().unwrap_or_default();
        let found = src.children(d).iter().any(|dc| {
            src.node(*dc).is_some_and(|dn| {
                dn.name == cmn.name
                    && (cmn.ns.is_none() || cmn.ns.is_invalid() || dn.ns == cmn.ns)
                    && dn.leaf_value() == Some(want)
            })
        });
        if !found {
            return false;
        }
    }

    if others.is_empty() {
        // only content matches: return the entire matching entry
        copy_allowed(src, d, out, out_parent, read_ok);
        return true;
    }

    // shell copy of d, then recurse into containment/selection children
    let Some(dnode) = src.node(d) else { return false };
    let mut shell = dnode.clone();
    shell.children = Vec::new();
    shell.edit = None;
    let new_id = out.add_child(out_parent, shell);

    // keys of a list entry always ride along
    for key in keys_of(src, d, schema) {
        if let Some(kid) = src.find_child(d, NsId::NONE, &key) {
            copy_allowed(src, kid, out, new_id, read_ok);
        }
    }
    // content-match leaves are part of the result
    for cm in &content_matches {
        if let Some(cmn) = ftree.node(*cm) {
            if let Some(kid) = src.find_child(d, cmn.ns, &cmn.name) {
                if src.find_child(d, NsId::NONE, &cmn.name).is_some()
                    && keys_of(src, d, schema).contains(&cmn.name)
                {
                    continue; // already copied as a key
                }
                copy_allowed(src, kid, out, new_id, read_ok);
            }
        }
    }

    let mut any = false;
    for fc in &others {
        for dc in src.children(d).to_vec() {
            if subtree_filter(src, dc, ftree, *fc, out, new_id, read_ok, schema) {
                any = true;
            }
        }
    }
    if !any && content_matches.is_empty() {
        // nothing under the shell matched; drop it
        out.free_subtree(new_id);
        return false;
    }
    true
}

fn keys_of(src: &ValueTree, id: NodeId, schema: &SchemaRegistry) -> Vec<String> {
    src.node(id)
        .and_then(|n| n.schema)
        .and_then(|sid| schema.node(sid))
        .map(|t| t.list_keys().to_vec())
        .unwrap_or_default()
}

/// Make sure the ancestor chain of `id` exists in `out`; returns the
/// out-tree parent to attach `id`'s copy under.
fn ensure_ancestors(
    src: &ValueTree,
    id: NodeId,
    out: &mut ValueTree,
    mapping: &mut Vec<(NodeId, NodeId)>,
    schema: &SchemaRegistry,
) -> NodeId {
    let Some(parent) = src.node(id).and_then(|n| n.parent) else {
        return mapping[0].1;
    };
    if let Some((_, mapped)) = mapping.iter().find(|(s, _)| *s == parent) {
        return *mapped;
    }
    let grand = ensure_ancestors(src, parent, out, mapping, schema);
    let Some(pnode) = src.node(parent) else { return grand };
    let mut shell = pnode.clone();
    shell.children = Vec::new();
    shell.edit = None;
    let new_id = out.add_child(grand, shell);
    for key in keys_of(src, parent, schema) {
        if let Some(kid) = src.find_child(parent, NsId::NONE, &key) {
            if let Some(knode) = src.node(kid) {
                let mut kcopy = knode.clone();
                kcopy.children = Vec::new();
                out.add_child(new_id, kcopy);
            }
        }
    }
    mapping.push((parent, new_id));
    new_id
}

/// Apply a with-defaults mode to a result tree in place.
pub fn apply_with_defaults(
    tree: &mut ValueTree,
    root: NodeId,
    mode: WithDefaults,
    schema: &SchemaRegistry,
    wd_ns: NsId,
) {
    match mode {
        WithDefaults::ReportAll => {}
        WithDefaults::Explicit => {
            remove_where(tree, root, &|n| n.from_default);
        }
        WithDefaults::Trim => {
            remove_where(tree, root, &|n| {
                let Some(sid) = n.schema else { return false };
                let Some(t) = schema.node(sid) else { return false };
                match (&t.kind, n.leaf_value()) {
                    (SchemaKind::Leaf { default: Some(d), .. }, Some(v)) => v == d,
                    _ => false,
                }
            });
        }
        WithDefaults::ReportAllTagged => {
            tag_defaults(tree, root, wd_ns);
        }
    }
}

fn remove_where(tree: &mut ValueTree, id: NodeId, pred: &dyn Fn(&ValueNode) -> bool) {
    for child in tree.children(id).to_vec() {
        if tree.node(child).is_some_and(pred) {
            tree.free_subtree(child);
        } else {
            remove_where(tree, child, pred);
        }
    }
}

fn tag_defaults(tree: &mut ValueTree, id: NodeId, wd_ns: NsId) {
    for child in tree.children(id).to_vec() {
        let is_default = tree.node(child).is_some_and(|n| n.from_default);
        if is_default {
            if let Some(node) = tree.node_mut(child) {
                node.attrs.push(ncs_core::value::XmlAttrMeta {
                    ns: wd_ns,
                    name: "default".to_string(),
                    value: "true".to_string(),
                });
            }
        }
        tag_defaults(tree, child, wd_ns);
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;

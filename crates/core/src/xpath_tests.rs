// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::value::{ValueKind, ValueNode};

fn no_prefixes(_: &str) -> Option<NsId> {
    None
}

fn sys_prefixes(p: &str) -> Option<NsId> {
    (p == "sys").then_some(NsId(1))
}

fn build_tree() -> (ValueTree, NodeId) {
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    let system = tree.add_child(root, ValueNode::new(NsId(1), "system", ValueKind::Container));
    tree.add_child(system, ValueNode::new(NsId(1), "hostname", ValueKind::Leaf("r1".into())));
    for name in ["fred", "barney"] {
        let user = tree.add_child(system, ValueNode::new(NsId(1), "user", ValueKind::List));
        tree.add_child(user, ValueNode::new(NsId(1), "name", ValueKind::Leaf(name.into())));
    }
    (tree, root)
}

#[test]
fn absolute_path_matches_single_leaf() {
    let (tree, root) = build_tree();
    let prog = XPathProgram::compile("/system/hostname", &no_prefixes).expect("compile");
    let hits = prog.eval(&tree, root);
    assert_eq!(hits.len(), 1);
    assert_eq!(tree.node(hits[0]).and_then(|n| n.leaf_value()), Some("r1"));
}

#[test]
fn predicate_selects_one_list_entry() {
    let (tree, root) = build_tree();
    let prog = XPathProgram::compile("/system/user[name='barney']", &no_prefixes).expect("compile");
    let hits = prog.eval(&tree, root);
    assert_eq!(hits.len(), 1);
    assert_eq!(tree.child_leaf_value(hits[0], "name"), Some("barney"));
}

#[test]
fn wildcard_step_matches_all_children() {
    let (tree, root) = build_tree();
    let prog = XPathProgram::compile("/system/*", &no_prefixes).expect("compile");
    assert_eq!(prog.eval(&tree, root).len(), 3);
}

#[test]
fn prefixed_step_requires_namespace_match() {
    let (tree, root) = build_tree();
    let prog = XPathProgram::compile("/sys:system", &sys_prefixes).expect("compile");
    assert_eq!(prog.eval(&tree, root).len(), 1);
}

#[test]
fn unknown_prefix_fails_compile() {
    let err = XPathProgram::compile("/nope:system", &no_prefixes).unwrap_err();
    assert_eq!(err, XPathError::UnknownPrefix("nope".into()));
}

#[test]
fn relative_path_rejected() {
    let err = XPathProgram::compile("system/hostname", &no_prefixes).unwrap_err();
    assert_eq!(err, XPathError::NotAbsolute);
}

#[test]
fn no_match_returns_empty_set() {
    let (tree, root) = build_tree();
    let prog = XPathProgram::compile("/system/user[name='wilma']", &no_prefixes).expect("compile");
    assert!(prog.eval(&tree, root).is_empty());
}

#[test]
fn double_quoted_predicate_values_accepted() {
    let (tree, root) = build_tree();
    let prog =
        XPathProgram::compile("/system/user[name=\"fred\"]", &no_prefixes).expect("compile");
    assert_eq!(prog.eval(&tree, root).len(), 1);
}

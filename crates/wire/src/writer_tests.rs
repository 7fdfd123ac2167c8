// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ncs_core::value::ValueNode;

fn registry() -> (NsRegistry, NsId, NsId) {
    let mut reg = NsRegistry::new();
    let nc = reg.register("urn:ietf:params:xml:ns:netconf:base:1.0", "nc");
    let sys = reg.register("urn:test:sys", "sys");
    (reg, nc, sys)
}

#[test]
fn canonical_prefix_declared_on_first_use() {
    let (reg, nc, _) = registry();
    let mut w = XmlWriter::new(&reg);
    w.start_element(nc, "rpc-reply");
    w.attr("message-id", "1");
    w.start_element(nc, "ok");
    w.end_element();
    w.end_element();
    assert_eq!(
        w.finish(),
        "<nc:rpc-reply xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\" \
         message-id=\"1\"><nc:ok/></nc:rpc-reply>"
    );
}

#[test]
fn prefix_collision_generates_fresh_prefix() {
    let mut reg = NsRegistry::new();
    let a = reg.register("urn:a", "x");
    let b = reg.register("urn:b", "x");
    let mut map = PrefixMap::new();
    assert_eq!(map.assign(a, &reg), Some("x"));
    assert_eq!(map.assign(b, &reg), Some("ns1"));
    // stable on re-query
    assert_eq!(map.lookup(a), Some("x"));
    assert_eq!(map.lookup(b), Some("ns1"));
}

#[test]
fn text_and_attrs_are_escaped() {
    let (reg, nc, _) = registry();
    let mut w = XmlWriter::new(&reg);
    w.start_element(nc, "data");
    w.attr("note", "a<b&\"c\"");
    w.text("1 < 2 & 3");
    w.end_element();
    let out = w.finish();
    assert!(out.contains("note=\"a&lt;b&amp;&quot;c&quot;\""));
    assert!(out.contains(">1 &lt; 2 &amp; 3<"));
}

#[test]
fn value_subtree_serialization() {
    let (reg, _, sys) = registry();
    let (mut tree, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    let system = tree.add_child(root, ValueNode::new(sys, "system", ValueKind::Container));
    tree.add_child(system, ValueNode::new(sys, "hostname", ValueKind::Leaf("r1".into())));
    tree.add_child(system, ValueNode::new(sys, "enabled", ValueKind::Empty));

    let mut w = XmlWriter::new(&reg);
    w.value_subtree(&tree, system);
    assert_eq!(
        w.finish(),
        "<sys:system xmlns:sys=\"urn:test:sys\"><sys:hostname>r1</sys:hostname>\
         <sys:enabled/></sys:system>"
    );
}

#[test]
fn no_namespace_elements_are_unprefixed() {
    let (reg, _, _) = registry();
    let mut w = XmlWriter::new(&reg);
    w.start_element(NsId::NONE, "plain");
    w.end_element();
    assert_eq!(w.finish(), "<plain/>");
}

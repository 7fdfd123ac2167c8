// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::xmlns::NsRegistry;

fn test_module(reg: &mut SchemaRegistry) -> (NsId, SchemaId) {
    let mut ns_reg = NsRegistry::new();
    let ns = ns_reg.register("urn:test:sys", "sys");
    let mut b = ModuleBuilder::new(
        reg,
        ns,
        ModuleInfo { name: "sys".into(), ns, prefix: "sys".into(), revision: None },
    );
    let system = b.container(None, "system", false);
    b.leaf(Some(system), "hostname", LeafType::String);
    let users = b.list(Some(system), "user", &["name"]);
    b.mandatory_leaf(Some(users), "name", LeafType::String);
    b.leaf_with_default(Some(users), "shell", LeafType::String, "/bin/sh");
    (ns, system)
}

#[test]
fn top_level_lookup_by_qualified_name() {
    let mut reg = SchemaRegistry::new();
    let (ns, system) = test_module(&mut reg);
    assert_eq!(reg.top(ns, "system"), Some(system));
    assert_eq!(reg.top(ns, "nonesuch"), None);
}

#[test]
fn child_lookup_walks_template_children() {
    let mut reg = SchemaRegistry::new();
    let (ns, system) = test_module(&mut reg);
    let user = reg.child(system, ns, "user").expect("user list");
    assert!(reg.is_list_key(user, "name"));
    assert!(!reg.is_list_key(user, "shell"));
    let shell = reg.child(user, ns, "shell").expect("shell leaf");
    assert_eq!(reg.node(shell).and_then(|n| n.default_value()), Some("/bin/sh"));
}

#[test]
fn leaf_type_checks() {
    assert!(LeafType::Uint32.check("4294967295"));
    assert!(!LeafType::Uint32.check("-1"));
    assert!(LeafType::Boolean.check("true"));
    assert!(!LeafType::Boolean.check("yes"));
    assert!(LeafType::Enumeration(vec!["a".into(), "b".into()]).check("b"));
    assert!(!LeafType::Enumeration(vec!["a".into()]).check("c"));
    assert!(LeafType::Empty.check(""));
    assert!(!LeafType::Empty.check("x"));
}

#[test]
fn mandatory_flag_survives_registration() {
    let mut reg = SchemaRegistry::new();
    let (ns, system) = test_module(&mut reg);
    let user = reg.child(system, ns, "user").expect("user list");
    let name = reg.child(user, ns, "name").expect("name leaf");
    assert!(reg.node(name).is_some_and(|n| n.mandatory));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ncs_core::schema::{LeafType, ModuleBuilder, ModuleInfo};
use ncs_core::value::{ValueKind, ValueNode};
use ncs_core::xmlns::NsId;

fn schema_with_list() -> (SchemaRegistry, NsId) {
    let ns = NsId(1);
    let mut schema = SchemaRegistry::new();
    let mut b = ModuleBuilder::new(
        &mut schema,
        ns,
        ModuleInfo { name: "sys".into(), ns, prefix: "sys".into(), revision: None },
    );
    let system = b.container(None, "system", false);
    b.leaf(Some(system), "mtu", LeafType::Uint32);
    let user = b.list(Some(system), "user", &["name"]);
    b.mandatory_leaf(Some(user), "name", LeafType::String);
    b.leaf(Some(user), "uid", LeafType::Uint32);
    (schema, ns)
}

fn tree_with(
    schema: &SchemaRegistry,
    ns: NsId,
    entries: &[(&str, Option<&str>)],
) -> (ncs_core::value::ValueTree, NodeId) {
    let (mut tree, root) =
        ncs_core::value::ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));
    let system_sid = schema.top(ns, "system").expect("system sid");
    let system = tree.add_child(
        root,
        ValueNode::new(ns, "system", ValueKind::Container).with_schema(system_sid),
    );
    let user_sid = schema.child(system_sid, ns, "user").expect("user sid");
    let name_sid = schema.child(user_sid, ns, "name").expect("name sid");
    for (name, uid) in entries {
        let entry =
            tree.add_child(system, ValueNode::new(ns, "user", ValueKind::List).with_schema(user_sid));
        if !name.is_empty() {
            tree.add_child(
                entry,
                ValueNode::new(ns, "name", ValueKind::Leaf(name.to_string())).with_schema(name_sid),
            );
        }
        if let Some(uid) = uid {
            let uid_sid = schema.child(user_sid, ns, "uid").expect("uid sid");
            tree.add_child(
                entry,
                ValueNode::new(ns, "uid", ValueKind::Leaf(uid.to_string())).with_schema(uid_sid),
            );
        }
    }
    (tree, root)
}

#[test]
fn valid_tree_has_no_errors() {
    let (schema, ns) = schema_with_list();
    let (tree, root) = tree_with(&schema, ns, &[("fred", Some("100"))]);
    assert!(root_check(&tree, root, &schema).is_empty());
}

#[test]
fn missing_list_key_is_reported_once_with_path() {
    let (schema, ns) = schema_with_list();
    let (tree, root) = tree_with(&schema, ns, &[("", None)]);
    let errors = root_check(&tree, root, &schema);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].status, Status::MissingElement(_)));
    assert!(errors[0].path.contains("/system/user"));
}

#[test]
fn duplicate_keys_are_not_unique() {
    let (schema, ns) = schema_with_list();
    let (tree, root) = tree_with(&schema, ns, &[("fred", None), ("fred", None)]);
    let errors = root_check(&tree, root, &schema);
    assert!(errors.iter().any(|e| e.status == Status::NotUnique));
}

#[test]
fn bad_leaf_type_is_invalid_value() {
    let (schema, ns) = schema_with_list();
    let (tree, root) = tree_with(&schema, ns, &[("fred", Some("not-a-number"))]);
    let errors = root_check(&tree, root, &schema);
    assert!(errors.iter().any(|e| matches!(e.status, Status::InvalidValue(_))));
}

#[test]
fn leafref_must_name_an_existing_instance() {
    let ns = NsId(1);
    let mut schema = SchemaRegistry::new();
    let mut b = ModuleBuilder::new(
        &mut schema,
        ns,
        ModuleInfo { name: "net".into(), ns, prefix: "net".into(), revision: None },
    );
    let system = b.container(None, "system", false);
    let user = b.list(Some(system), "user", &["name"]);
    b.mandatory_leaf(Some(user), "name", LeafType::String);
    let owner =
        b.leaf(Some(system), "owner", LeafType::Leafref("/system/user/name".into()));

    let (mut tree, root) = ncs_core::value::ValueTree::with_root(ValueNode::new(
        NsId::NONE,
        "config",
        ValueKind::Container,
    ));
    let system_sid = schema.top(ns, "system").expect("sid");
    let sys = tree.add_child(
        root,
        ValueNode::new(ns, "system", ValueKind::Container).with_schema(system_sid),
    );
    let user_sid = schema.child(system_sid, ns, "user").expect("sid");
    let name_sid = schema.child(user_sid, ns, "name").expect("sid");
    let entry =
        tree.add_child(sys, ValueNode::new(ns, "user", ValueKind::List).with_schema(user_sid));
    tree.add_child(
        entry,
        ValueNode::new(ns, "name", ValueKind::Leaf("fred".into())).with_schema(name_sid),
    );
    let owner_node = tree.add_child(
        sys,
        ValueNode::new(ns, "owner", ValueKind::Leaf("fred".into())).with_schema(owner),
    );

    assert!(root_check(&tree, root, &schema).is_empty());

    // dangling reference
    if let Some(n) = tree.node_mut(owner_node) {
        n.kind = ValueKind::Leaf("wilma".into());
    }
    let errors = root_check(&tree, root, &schema);
    assert!(errors.iter().any(|e| e.status == Status::DataMissing));
}

#[test]
fn all_errors_accumulate_in_one_pass() {
    let (schema, ns) = schema_with_list();
    // two entries, both broken differently
    let (tree, root) = tree_with(&schema, ns, &[("", Some("x")), ("fred", Some("y"))]);
    let errors = root_check(&tree, root, &schema);
    assert!(errors.len() >= 3);
}

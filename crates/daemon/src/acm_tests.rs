// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ncs_core::value::{ValueKind, ValueNode};

const NACM_NS: NsId = NsId(5);
const SYS_NS: NsId = NsId(1);

fn leaf(tree: &mut ValueTree, parent: NodeId, ns: NsId, name: &str, value: &str) -> NodeId {
    tree.add_child(parent, ValueNode::new(ns, name, ValueKind::Leaf(value.into())))
}

/// Build a config tree carrying a /nacm subtree:
/// group "admins" = [alice]; rule-list for admins permits everything;
/// a wildcard rule-list denies writes to /system.
fn nacm_tree() -> (ValueTree, NodeId, NodeId) {
    let (mut t, root) =
        ValueTree::with_root(ValueNode::new(NsId::NONE, "config", ValueKind::Container));

    let system = t.add_child(root, ValueNode::new(SYS_NS, "system", ValueKind::Container));
    leaf(&mut t, system, SYS_NS, "hostname", "r1");

    let nacm = t.add_child(root, ValueNode::new(NACM_NS, "nacm", ValueKind::Container));
    leaf(&mut t, nacm, NACM_NS, "enable-nacm", "true");

    let groups = t.add_child(nacm, ValueNode::new(NACM_NS, "groups", ValueKind::Container));
    let admins = t.add_child(groups, ValueNode::new(NACM_NS, "group", ValueKind::List));
    leaf(&mut t, admins, NACM_NS, "name", "admins");
    leaf(&mut t, admins, NACM_NS, "user-name", "alice");

    let rl = t.add_child(nacm, ValueNode::new(NACM_NS, "rule-list", ValueKind::List));
    leaf(&mut t, rl, NACM_NS, "name", "admin-rules");
    leaf(&mut t, rl, NACM_NS, "group", "admins");
    let rule = t.add_child(rl, ValueNode::new(NACM_NS, "rule", ValueKind::List));
    leaf(&mut t, rule, NACM_NS, "name", "permit-all");
    leaf(&mut t, rule, NACM_NS, "access-operations", "*");
    leaf(&mut t, rule, NACM_NS, "action", "permit");

    let rl2 = t.add_child(nacm, ValueNode::new(NACM_NS, "rule-list", ValueKind::List));
    leaf(&mut t, rl2, NACM_NS, "name", "guard-system");
    leaf(&mut t, rl2, NACM_NS, "group", "*");
    let rule2 = t.add_child(rl2, ValueNode::new(NACM_NS, "rule", ValueKind::List));
    leaf(&mut t, rule2, NACM_NS, "name", "deny-system-write");
    leaf(&mut t, rule2, NACM_NS, "path", "/system");
    leaf(&mut t, rule2, NACM_NS, "access-operations", "create update delete");
    leaf(&mut t, rule2, NACM_NS, "action", "deny");

    (t, root, system)
}

fn profile() -> Profile {
    Profile::default()
}

#[test]
fn group_rule_permits_member() {
    let (tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = profile();
    // alice is in admins: permit-all matches first
    assert!(acm.data_allowed(&p, SessionId(2), "alice", &tree, root, NACM_NS, system, Access::Write));
}

#[test]
fn wildcard_group_rule_denies_non_member_write() {
    let (tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = profile();
    assert!(!acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Write));
    // reads still fall through to the permit default
    assert!(acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Read));
}

#[test]
fn rule_covers_descendants_of_matched_node() {
    let (tree, root, system) = nacm_tree();
    let hostname = tree.find_child(system, SYS_NS, "hostname").expect("hostname");
    let mut acm = AcmState::new();
    let p = profile();
    assert!(!acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, hostname, Access::Write));
}

#[test]
fn superuser_short_circuits_everything() {
    let (tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = Profile { superuser: Some("root".into()), ..profile() };
    assert!(acm.data_allowed(&p, SessionId(3), "root", &tree, root, NACM_NS, system, Access::Write));
}

#[test]
fn internal_session_bypasses_checks() {
    let (tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = profile();
    assert!(acm.data_allowed(
        &p,
        SessionId::INTERNAL,
        "-",
        &tree,
        root,
        NACM_NS,
        system,
        Access::Write
    ));
}

#[test]
fn acm_off_mode_permits_all() {
    let (tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = Profile { acm_mode: AcmMode::Off, ..profile() };
    assert!(acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Write));
}

#[test]
fn rpc_exec_uses_defaults_when_no_rule_matches() {
    let (tree, root, _) = nacm_tree();
    let mut acm = AcmState::new();
    let p = profile();
    // exec-default is permit
    assert!(acm.rpc_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, "netconf", "get"));
}

#[test]
fn cache_invalidation_rebuilds_on_generation_bump() {
    let (mut tree, root, system) = nacm_tree();
    let mut acm = AcmState::new();
    let p = profile();
    assert!(!acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Write));

    // flip the deny rule to permit, then invalidate
    let nacm = tree.find_child(root, NACM_NS, "nacm").expect("nacm");
    let rl2 = tree
        .find_list_entry(nacm, NACM_NS, "rule-list", &[("name".into(), "guard-system".into())])
        .expect("rule-list");
    let rule = tree.find_child(rl2, NACM_NS, "rule").expect("rule");
    let action = tree.find_child(rule, NACM_NS, "action").expect("action");
    if let Some(n) = tree.node_mut(action) {
        n.kind = ValueKind::Leaf("permit".into());
    }

    // stale cache still denies until invalidated
    assert!(!acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Write));
    acm.invalidate_all();
    assert!(acm.data_allowed(&p, SessionId(3), "bob", &tree, root, NACM_NS, system, Access::Write));
}

#[test]
fn access_ops_parsing() {
    let all = AccessOps::parse("*");
    assert!(all.read && all.write && all.exec);
    let rw = AccessOps::parse("read update");
    assert!(rw.read && rw.write && !rw.exec);
    let none = AccessOps::parse("");
    assert!(!none.read && !none.write && !none.exec);
}

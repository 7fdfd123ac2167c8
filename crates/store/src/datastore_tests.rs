// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ncs_core::schema::{LeafType, ModuleBuilder, ModuleInfo};
use ncs_core::xmlns::NsRegistry;

const SYS_URI: &str = "urn:test:sys";

fn fixtures() -> (NsRegistry, SchemaRegistry, NsId) {
    let mut reg = NsRegistry::new();
    let ns = reg.register(SYS_URI, "sys");
    let mut schema = SchemaRegistry::new();
    let mut b = ModuleBuilder::new(
        &mut schema,
        ns,
        ModuleInfo { name: "sys".into(), ns, prefix: "sys".into(), revision: None },
    );
    let system = b.container(None, "system", false);
    b.leaf(Some(system), "hostname", LeafType::String);
    b.leaf_with_default(Some(system), "mtu", LeafType::Uint32, "1500");
    let user = b.list(Some(system), "user", &["name"]);
    b.mandatory_leaf(Some(user), "name", LeafType::String);
    (reg, schema, ns)
}

fn lookup_for(uri: &'static str, ns: NsId) -> impl Fn(&str) -> NsId + Send + Clone + 'static {
    move |u: &str| if u == uri { ns } else { NsId::INVALID }
}

#[test]
fn load_save_load_round_trips() {
    let (reg, schema, ns) = fixtures();
    let lookup = lookup_for(SYS_URI, ns);
    let doc = format!(
        "<config><system xmlns=\"{SYS_URI}\"><hostname>r1</hostname>\
         <user><name>fred</name></user></system></config>"
    );

    let mut ds = Datastore::new(DatastoreName::Running);
    ds.load_from_xml(doc.into_bytes(), &schema, lookup.clone(), LoadPolicy::Prune)
        .expect("load");
    assert!(ds.load_errors().is_empty());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("startup-cfg.xml");
    ds.save_to_file(&path, &reg).expect("save");
    assert!(!dir.path().join("startup-cfg.xml.tmp").exists());

    let mut ds2 = Datastore::new(DatastoreName::Running);
    ds2.load_from_file(&path, &schema, lookup, LoadPolicy::Prune).expect("reload");
    let a = ds.root();
    let b = ds2.root();
    assert!(ds.tree().subtree_equal(a, ds2.tree(), b));
}

#[test]
fn unknown_subtree_is_pruned_and_recorded() {
    let (_, schema, ns) = fixtures();
    let doc = format!(
        "<config><system xmlns=\"{SYS_URI}\"><bogus><deep/></bogus>\
         <hostname>r1</hostname></system></config>"
    );
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.load_from_xml(doc.into_bytes(), &schema, lookup_for(SYS_URI, ns), LoadPolicy::Prune)
        .expect("load");
    assert_eq!(ds.load_errors().len(), 1);
    let system = ds.tree().find_child(ds.root(), ns, "system").expect("system");
    assert!(ds.tree().find_child(system, ns, "bogus").is_none());
    assert!(ds.tree().find_child(system, ns, "hostname").is_some());
}

#[test]
fn fatal_policy_refuses_unknown_subtree() {
    let (_, schema, ns) = fixtures();
    let doc = format!("<config><nope xmlns=\"{SYS_URI}\"/></config>");
    let mut ds = Datastore::new(DatastoreName::Running);
    let err = ds
        .load_from_xml(doc.into_bytes(), &schema, lookup_for(SYS_URI, ns), LoadPolicy::Fatal)
        .unwrap_err();
    assert!(matches!(err, StoreError::LoadFatal { .. }));
}

#[test]
fn default_fill_adds_missing_leaf_once() {
    let (_, schema, ns) = fixtures();
    let doc = format!("<config><system xmlns=\"{SYS_URI}\"><hostname>r1</hostname></system></config>");
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.load_from_xml(doc.into_bytes(), &schema, lookup_for(SYS_URI, ns), LoadPolicy::Prune)
        .expect("load");

    assert_eq!(ds.default_fill(&schema), 1);
    let system = ds.tree().find_child(ds.root(), ns, "system").expect("system");
    let mtu = ds.tree().find_child(system, ns, "mtu").expect("mtu");
    assert!(ds.tree().node(mtu).is_some_and(|n| n.from_default));
    assert_eq!(ds.tree().node(mtu).and_then(|n| n.leaf_value()), Some("1500"));

    // second pass is a no-op
    assert_eq!(ds.default_fill(&schema), 0);
}

#[test]
fn prune_removes_empty_non_presence_containers() {
    let (_, schema, ns) = fixtures();
    let doc = format!("<config><system xmlns=\"{SYS_URI}\"></system></config>");
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.load_from_xml(doc.into_bytes(), &schema, lookup_for(SYS_URI, ns), LoadPolicy::Prune)
        .expect("load");
    assert_eq!(ds.prune_empty_containers(&schema), 1);
    assert!(ds.tree().find_child(ds.root(), ns, "system").is_none());
}

#[test]
fn lock_is_exclusive_per_session() {
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.lock(SessionId(1)).expect("lock");
    let err = ds.lock(SessionId(2)).unwrap_err();
    match err {
        StoreError::Locked { holder, .. } => assert_eq!(holder, SessionId(1)),
        other => panic!("unexpected error {other:?}"),
    }
    // owner may re-lock (idempotent) and unlock
    ds.lock(SessionId(1)).expect("relock");
    ds.unlock(SessionId(1)).expect("unlock");
    ds.lock(SessionId(2)).expect("lock after release");
}

#[test]
fn release_lock_for_dead_session() {
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.lock(SessionId(9)).expect("lock");
    ds.release_lock_for(SessionId(9));
    assert_eq!(ds.lock_holder(), None);
}

#[test]
fn snapshot_restore_round_trip() {
    let (_, schema, ns) = fixtures();
    let doc = format!("<config><system xmlns=\"{SYS_URI}\"><hostname>r1</hostname></system></config>");
    let mut ds = Datastore::new(DatastoreName::Running);
    ds.load_from_xml(doc.into_bytes(), &schema, lookup_for(SYS_URI, ns), LoadPolicy::Prune)
        .expect("load");
    let snap = ds.snapshot();

    // mutate, then restore
    let system = ds.tree().find_child(ds.root(), ns, "system").expect("system");
    ds.tree_mut().free_subtree(system);
    assert!(ds.tree().find_child(ds.root(), ns, "system").is_none());

    ds.restore(snap);
    let system = ds.tree().find_child(ds.root(), ns, "system").expect("system back");
    assert_eq!(ds.tree().child_leaf_value(system, "hostname"), Some("r1"));
}

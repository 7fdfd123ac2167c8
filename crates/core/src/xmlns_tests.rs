// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace registry tests: stable ids, idempotent registration,
//! invalid-id round-trip for unknown URIs.

use super::*;

#[test]
fn ids_are_stable_and_start_at_one() {
    let mut reg = NsRegistry::new();
    let a = reg.register("urn:example:a", "a");
    let b = reg.register("urn:example:b", "b");
    assert_eq!(a, NsId(1));
    assert_eq!(b, NsId(2));
    assert_eq!(reg.uri(a), Some("urn:example:a"));
    assert_eq!(reg.prefix(b), Some("b"));
}

#[test]
fn re_registration_returns_existing_id() {
    let mut reg = NsRegistry::new();
    let a = reg.register("urn:example:a", "a");
    let again = reg.register("urn:example:a", "other");
    assert_eq!(a, again);
    // first registration owns the canonical prefix
    assert_eq!(reg.prefix(a), Some("a"));
    assert_eq!(reg.len(), 1);
}

#[test]
fn unknown_uri_resolves_to_invalid() {
    let reg = NsRegistry::new();
    let id = reg.lookup("urn:nobody:registered:this");
    assert!(id.is_invalid());
    assert_eq!(reg.uri(id), None);
}

#[test]
fn zero_means_no_namespace() {
    let reg = NsRegistry::new();
    assert!(NsId::NONE.is_none());
    assert_eq!(reg.uri(NsId::NONE), None);
}

#[test]
fn well_known_set_registers_base_namespaces() {
    let mut reg = NsRegistry::new();
    let wk = reg.register_well_known();
    assert_eq!(reg.uri(wk.nc), Some(NC_URI));
    assert_eq!(reg.uri(wk.nacm), Some(NACM_URI));
    assert_eq!(reg.uri(wk.plock), Some(PLOCK_URI));
    assert_eq!(reg.lookup(NC_URI), wk.nc);
}

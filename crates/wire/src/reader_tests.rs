// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const NC: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

fn lookup(uri: &str) -> NsId {
    match uri {
        "urn:ietf:params:xml:ns:netconf:base:1.0" => NsId(1),
        "urn:test:sys" => NsId(2),
        _ => NsId::INVALID,
    }
}

fn reader(doc: &str) -> XmlReader {
    XmlReader::new(doc.as_bytes().to_vec(), lookup)
}

#[test]
fn start_event_resolves_default_namespace() {
    let mut r = reader(&format!("<rpc xmlns=\"{NC}\" message-id=\"1\"><get/></rpc>"));
    match r.next_event().expect("event") {
        XmlEvent::Start { ns, name, attrs } => {
            assert_eq!(ns, NsId(1));
            assert_eq!(name, "rpc");
            let mid = attrs.iter().find(|a| a.name == "message-id").expect("message-id");
            assert_eq!(mid.value, "1");
            assert_eq!(mid.prefix_len, 0);
            assert_eq!(mid.ns, NsId::NONE);
        }
        other => panic!("expected start, got {other:?}"),
    }
    match r.next_event().expect("event") {
        XmlEvent::Empty { ns, name, .. } => {
            assert_eq!(ns, NsId(1));
            assert_eq!(name, "get");
        }
        other => panic!("expected empty, got {other:?}"),
    }
}

#[test]
fn prefixed_element_and_attribute_resolution() {
    let mut r = reader(
        "<nc:rpc xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\" \
         nc:att=\"v\" plain=\"w\"/>",
    );
    match r.next_event().expect("event") {
        XmlEvent::Empty { ns, name, attrs } => {
            assert_eq!(ns, NsId(1));
            assert_eq!(name, "rpc");
            let qualified = attrs.iter().find(|a| a.name == "att").expect("att");
            assert_eq!(qualified.ns, NsId(1));
            assert_eq!(qualified.prefix_len, 2);
            let plain = attrs.iter().find(|a| a.name == "plain").expect("plain");
            assert_eq!(plain.ns, NsId::NONE);
            assert!(!plain.is_qualified());
        }
        other => panic!("expected empty, got {other:?}"),
    }
}

#[test]
fn unknown_namespace_round_trips_as_invalid() {
    let mut r = reader("<thing xmlns=\"urn:who:knows\"/>");
    match r.next_event().expect("event") {
        XmlEvent::Empty { ns, .. } => assert!(ns.is_invalid()),
        other => panic!("expected empty, got {other:?}"),
    }
}

#[test]
fn text_is_unescaped() {
    let mut r = reader("<a>one &amp; two</a>");
    let _ = r.next_event().expect("start");
    match r.next_event().expect("text") {
        XmlEvent::Text(t) => assert_eq!(t, "one & two"),
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn select_attribute_is_compiled_eagerly() {
    let mut r = reader(
        "<partial-lock xmlns:sys=\"urn:test:sys\" select=\"/sys:system/sys:hostname\"/>",
    );
    match r.next_event().expect("event") {
        XmlEvent::Empty { attrs, .. } => {
            let select = attrs.iter().find(|a| a.name == "select").expect("select");
            let prog = select.xpath.as_ref().expect("compiled").as_ref().expect("ok");
            assert_eq!(prog.source(), "/sys:system/sys:hostname");
        }
        other => panic!("expected empty, got {other:?}"),
    }
}

#[test]
fn select_with_unknown_prefix_carries_the_error() {
    let mut r = reader("<lock select=\"/bad:thing\"/>");
    match r.next_event().expect("event") {
        XmlEvent::Empty { attrs, .. } => {
            let select = attrs.iter().find(|a| a.name == "select").expect("select");
            assert!(select.xpath.as_ref().expect("compiled").is_err());
        }
        other => panic!("expected empty, got {other:?}"),
    }
}

#[test]
fn missing_prolog_is_synthesized() {
    // no <?xml ?> declaration; parse must still succeed
    let mut r = reader("<hello/>");
    assert!(matches!(r.next_event().expect("event"), XmlEvent::Empty { .. }));
    assert!(matches!(r.next_event().expect("event"), XmlEvent::Eof));
}

#[test]
fn skip_subtree_consumes_to_matching_end() {
    let mut r = reader("<a><b><c>x</c><d/></b><e/></a>");
    let _ = r.next_event().expect("a");
    let _ = r.next_event().expect("b");
    r.skip_subtree().expect("skip b");
    match r.next_event().expect("event") {
        XmlEvent::Empty { name, .. } => assert_eq!(name, "e"),
        other => panic!("expected e, got {other:?}"),
    }
}

#[test]
fn nested_scopes_unwind_on_end() {
    let mut r = reader(
        "<a xmlns=\"urn:test:sys\"><b xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/><c/></a>",
    );
    let _ = r.next_event().expect("a");
    match r.next_event().expect("b") {
        XmlEvent::Empty { ns, .. } => assert_eq!(ns, NsId(1)),
        other => panic!("expected b, got {other:?}"),
    }
    match r.next_event().expect("c") {
        XmlEvent::Empty { ns, .. } => assert_eq!(ns, NsId(2)),
        other => panic!("expected c, got {other:?}"),
    }
}

#[test]
fn malformed_xml_is_an_error() {
    let mut r = reader("<a><b></a>");
    let _ = r.next_event().expect("a");
    let _ = r.next_event().expect("b");
    assert!(r.next_event().is_err());
}

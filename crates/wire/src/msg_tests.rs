// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ncs_core::error::Status;

fn registry() -> (NsRegistry, NsId) {
    let mut reg = NsRegistry::new();
    let nc = reg.register("urn:ietf:params:xml:ns:netconf:base:1.0", "nc");
    (reg, nc)
}

#[test]
fn ok_reply_echoes_message_id() {
    let (reg, nc) = registry();
    let out = ReplyBuilder::new(nc, Some(MsgId::from("42"))).build(&reg, ReplyBody::Ok);
    assert!(out.contains("message-id=\"42\""));
    assert!(out.contains("<nc:ok/>"));
    assert!(out.starts_with("<nc:rpc-reply"));
    assert!(out.ends_with("</nc:rpc-reply>"));
}

#[test]
fn omitted_message_id_produces_reply_without_one() {
    let (reg, nc) = registry();
    let out = ReplyBuilder::new(nc, None).build(&reg, ReplyBody::Ok);
    assert!(!out.contains("message-id"));
    assert!(out.contains("<nc:ok/>"));
}

#[test]
fn data_reply_embeds_inner_xml() {
    let (reg, nc) = registry();
    let out = ReplyBuilder::new(nc, Some(MsgId::from("1")))
        .build(&reg, ReplyBody::Data("<x>1</x>".to_string()));
    assert!(out.contains("<nc:data><x>1</x></nc:data>"));
}

#[test]
fn error_reply_contains_full_record() {
    let (reg, nc) = registry();
    let mut errors = RpcErrorList::new();
    errors.push(
        RpcError::from_status(&Status::LockDenied(7))
            .with_path("/")
            .with_info(ErrorInfo::SessionId(7)),
    );
    let out =
        ReplyBuilder::new(nc, Some(MsgId::from("9"))).build(&reg, ReplyBody::Errors(errors));
    assert!(out.contains("<nc:error-type>protocol</nc:error-type>"));
    assert!(out.contains("<nc:error-tag>lock-denied</nc:error-tag>"));
    assert!(out.contains("<nc:error-severity>error</nc:error-severity>"));
    assert!(out.contains("<nc:error-path>/</nc:error-path>"));
    assert!(out.contains("<nc:session-id>7</nc:session-id>"));
    assert!(out.contains("xml:lang=\"en\""));
}

#[test]
fn multiple_errors_are_emitted_together() {
    let (reg, nc) = registry();
    let mut errors = RpcErrorList::new();
    errors.push_status(&Status::DataExists);
    errors.push_status(&Status::MissingElement("name".into()));
    let out = ReplyBuilder::new(nc, None).build(&reg, ReplyBody::Errors(errors));
    assert_eq!(out.matches("<nc:rpc-error>").count(), 2);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn from_status_uses_translation_table() {
    let err = RpcError::from_status(&Status::LockDenied(5));
    assert_eq!(err.error_tag, ErrorTag::LockDenied);
    assert_eq!(err.error_type, ErrorType::Protocol);
    assert_eq!(err.severity, ErrorSeverity::Error);
    assert!(err.message.as_deref().is_some_and(|m| m.contains('5')));
}

#[test]
fn builder_attaches_path_and_info() {
    let err = RpcError::from_status(&Status::MissingElement("name".into()))
        .with_path("/interfaces/interface")
        .with_info(ErrorInfo::BadElement("interface".into()));
    assert_eq!(err.path.as_deref(), Some("/interfaces/interface"));
    assert_eq!(err.info.len(), 1);
    assert_eq!(err.info[0].element_name(), "bad-element");
}

#[test]
fn list_accumulates_in_order() {
    let mut list = RpcErrorList::new();
    list.push_status(&Status::DataExists);
    list.push_status(&Status::DataMissing);
    let tags: Vec<ErrorTag> = list.iter().map(|e| e.error_tag).collect();
    assert_eq!(tags, vec![ErrorTag::DataExists, ErrorTag::DataMissing]);
}

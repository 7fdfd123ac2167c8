// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_file_loads_as_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let f = TxIdFile::new(dir.path().join("txid"));
    assert_eq!(f.load().expect("load"), TxId(0));
}

#[test]
fn store_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let f = TxIdFile::new(dir.path().join("txid"));
    f.store(TxId(41)).expect("store");
    assert_eq!(f.load().expect("load"), TxId(41));
    f.store(TxId(42)).expect("store");
    assert_eq!(f.load().expect("load"), TxId(42));
}

#[test]
fn corrupt_contents_are_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("txid");
    std::fs::write(&path, "not-a-number\n").expect("write");
    let f = TxIdFile::new(&path);
    assert!(matches!(f.load(), Err(TxIdError::Corrupt(_))));
}

#[test]
fn no_temp_file_left_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let f = TxIdFile::new(dir.path().join("txid"));
    f.store(TxId(7)).expect("store");
    assert!(!dir.path().join("txid.tmp").exists());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes shared across the server.
//!
//! SessionId identifies a client session slot; session 0 is reserved for
//! server-internal configuration edits. TxId identifies a datastore
//! transaction and is persisted across restarts. LockId identifies a
//! partial lock. MsgId is the opaque `message-id` echoed on replies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a client session.
///
/// Drawn from a bounded pool; slot 0 is the reserved pseudo-session used
/// when server-internal code mutates configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    /// The reserved server-internal pseudo-session.
    pub const INTERNAL: SessionId = SessionId(0);

    pub fn is_internal(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing datastore transaction identifier.
///
/// The value persisted after a commit is strictly greater than any
/// previously committed one, surviving restart via the sidecar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl TxId {
    pub fn next(self) -> TxId {
        TxId(self.0 + 1)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partial lock identifier, unique within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(pub u32);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque `message-id` attribute from an `<rpc>` element.
///
/// The wire mandates it be echoed on the reply; the server never
/// interprets the contents. `None` models a peer that omitted it, in
/// which case the reply is emitted without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgId(pub String);

impl MsgId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MsgId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System notifications and the bounded event log.
//!
//! Notification records are appended to a ring capped at the profile's
//! eventlog-size and fanned out to every subscribed session in source
//! order. Delivery to one session drains at most max-burst records per
//! pass.

use chrono::{DateTime, SecondsFormat, Utc};
use ncs_core::id::{SessionId, TxId};
use ncs_core::value::EditOp;
use ncs_core::xmlns::{NsId, NsRegistry};
use ncs_wire::writer::XmlWriter;
use std::collections::VecDeque;

/// Confirmed-commit notification event values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitEvent {
    Start,
    Cancel,
    Timeout,
    Complete,
    Extend,
}

impl CommitEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitEvent::Start => "start",
            CommitEvent::Cancel => "cancel",
            CommitEvent::Timeout => "timeout",
            CommitEvent::Complete => "complete",
            CommitEvent::Extend => "extend",
        }
    }
}

/// One audit record from a committed transaction.
#[derive(Debug, Clone)]
pub struct AuditEdit {
    pub target: String,
    pub operation: EditOp,
}

/// Payload variants of the system notification module.
#[derive(Debug, Clone)]
pub enum EventKind {
    SessionStart {
        sid: SessionId,
        user: String,
        peer: String,
    },
    SessionEnd {
        sid: SessionId,
        user: String,
        peer: String,
        reason: String,
        killed_by: Option<SessionId>,
    },
    ConfigChange {
        sid: SessionId,
        user: String,
        txid: TxId,
        edits: Vec<AuditEdit>,
    },
    ConfirmedCommit {
        sid: SessionId,
        user: String,
        event: CommitEvent,
    },
}

impl EventKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            EventKind::SessionStart { .. } => "sysSessionStart",
            EventKind::SessionEnd { .. } => "sysSessionEnd",
            EventKind::ConfigChange { .. } => "sysConfigChange",
            EventKind::ConfirmedCommit { .. } => "sysConfirmedCommit",
        }
    }
}

/// One recorded notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub time: DateTime<Utc>,
    pub kind: EventKind,
}

impl Notification {
    /// Serialize to the wire document.
    pub fn to_xml(&self, reg: &NsRegistry, ncn: NsId, sys: NsId) -> String {
        let mut w = XmlWriter::new(reg);
        w.start_element(ncn, "notification");
        w.leaf_element(ncn, "eventTime", &self.time.to_rfc3339_opts(SecondsFormat::Secs, true));
        w.start_element(sys, self.kind.element_name());
        match &self.kind {
            EventKind::SessionStart { sid, user, peer } => {
                w.leaf_element(sys, "userName", user);
                w.leaf_element(sys, "sessionId", &sid.to_string());
                w.leaf_element(sys, "remoteHost", peer);
            }
            EventKind::SessionEnd { sid, user, peer, reason, killed_by } => {
                w.leaf_element(sys, "userName", user);
                w.leaf_element(sys, "sessionId", &sid.to_string());
                w.leaf_element(sys, "remoteHost", peer);
                if let Some(killer) = killed_by {
                    w.leaf_element(sys, "killedBy", &killer.to_string());
                }
                w.leaf_element(sys, "terminationReason", reason);
            }
            EventKind::ConfigChange { sid, user, txid, edits } => {
                w.leaf_element(sys, "userName", user);
                w.leaf_element(sys, "sessionId", &sid.to_string());
                w.leaf_element(sys, "transactionId", &txid.to_string());
                for edit in edits {
                    w.start_element(sys, "edit");
                    w.leaf_element(sys, "target", &edit.target);
                    w.leaf_element(sys, "operation", edit.operation.as_str());
                    w.end_element();
                }
            }
            EventKind::ConfirmedCommit { sid, user, event } => {
                w.leaf_element(sys, "userName", user);
                w.leaf_element(sys, "sessionId", &sid.to_string());
                w.leaf_element(sys, "confirmEvent", event.as_str());
            }
        }
        w.end_element();
        w.end_element();
        w.finish()
    }
}

/// Bounded event log.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<Notification>,
    cap: usize,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), cap }
    }

    pub fn push(&mut self, notif: Notification) {
        if self.cap > 0 && self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(notif);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "notif_tests.rs"]
mod tests;

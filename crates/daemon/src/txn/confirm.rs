// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Confirmed-commit state.
//!
//! `<commit confirmed timeout=T>` snapshots running before the commit
//! and arms a deadline. A plain `<commit>` confirms, `<cancel-commit>`
//! restores the snapshot, and deadline expiry restores the snapshot and
//! emits sysConfirmedCommit(event=timeout). A persist-id detaches the
//! confirmation from the originating session, so only session death of
//! a non-persisted confirm cancels.

use chrono::{DateTime, Duration, Utc};
use ncs_core::id::SessionId;
use ncs_core::value::ValueTree;

/// Armed confirmed-commit.
#[derive(Debug)]
pub struct ConfirmState {
    /// Session that issued the confirmed commit.
    pub sid: SessionId,
    /// Detaches confirmation from `sid` when set.
    pub persist_id: Option<String>,
    /// Running datastore content at commit time.
    pub snapshot: ValueTree,
    pub armed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConfirmState {
    pub fn new(
        sid: SessionId,
        persist_id: Option<String>,
        snapshot: ValueTree,
        now: DateTime<Utc>,
        timeout_secs: u32,
    ) -> Self {
        Self {
            sid,
            persist_id,
            snapshot,
            armed_at: now,
            expires_at: now + Duration::seconds(i64::from(timeout_secs)),
        }
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Extend the deadline (follow-up confirmed commit).
    pub fn extend(&mut self, now: DateTime<Utc>, timeout_secs: u32) {
        self.expires_at = now + Duration::seconds(i64::from(timeout_secs));
    }

    /// May `sid` confirm or cancel this commit? With a persist-id the
    /// requester must present the matching id regardless of session.
    pub fn may_complete(&self, sid: SessionId, persist_id: Option<&str>) -> bool {
        match &self.persist_id {
            Some(want) => persist_id == Some(want.as_str()),
            None => sid == self.sid,
        }
    }

    /// Does this session's death cancel the pending confirm?
    pub fn cancelled_by_session_end(&self, sid: SessionId) -> bool {
        self.persist_id.is_none() && self.sid == sid
    }
}

#[cfg(test)]
#[path = "confirm_tests.rs"]
mod tests;

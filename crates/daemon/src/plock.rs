// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial-lock registry (RFC 5717).
//!
//! Each lock records the XPath select strings and the node set they
//! matched at lock time; the set is frozen. A new lock is refused when
//! its set intersects any held lock's set on the same datastore. Lock
//! ids come from a process-lifetime dispenser; id zero is never used.

use chrono::{DateTime, Utc};
use ncs_core::error::Status;
use ncs_core::id::{LockId, SessionId};
use ncs_core::value::NodeId;
use tracing::{debug, info};

/// One held partial lock.
#[derive(Debug, Clone)]
pub struct PartialLock {
    pub lock_id: LockId,
    pub sid: SessionId,
    pub locked_at: DateTime<Utc>,
    /// Subtree roots selected at lock time.
    pub nodes: Vec<NodeId>,
    /// The select expressions that produced them.
    pub selects: Vec<String>,
}

impl PartialLock {
    /// True when `node` or any ancestor/descendant relation intersects
    /// this lock's frozen node set. Ancestry is resolved by the caller;
    /// here the check is direct membership.
    pub fn covers(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

/// Registry of all partial locks held on one datastore.
#[derive(Debug, Default)]
pub struct PartialLockRegistry {
    locks: Vec<PartialLock>,
    last_id: u32,
}

impl PartialLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a new lock over `nodes`. Overlap with any held lock's set
    /// refuses with lock-denied naming the holder.
    pub fn acquire(
        &mut self,
        sid: SessionId,
        now: DateTime<Utc>,
        nodes: Vec<NodeId>,
        selects: Vec<String>,
    ) -> Result<LockId, Status> {
        // only 2^32-1 locks per process lifetime
        if self.last_id == u32::MAX {
            return Err(Status::ResourceDenied("partial-lock ids exhausted".to_string()));
        }
        for held in &self.locks {
            if held.nodes.iter().any(|n| nodes.contains(n)) {
                return Err(Status::LockDenied(held.sid.0));
            }
        }
        self.last_id += 1;
        let lock_id = LockId(self.last_id);
        info!(session = %sid, lock = %lock_id, "partial lock acquired");
        self.locks.push(PartialLock { lock_id, sid, locked_at: now, nodes, selects });
        Ok(lock_id)
    }

    pub fn get(&self, lock_id: LockId) -> Option<&PartialLock> {
        self.locks.iter().find(|l| l.lock_id == lock_id)
    }

    /// Release by id; only the owner may release.
    pub fn release(&mut self, sid: SessionId, lock_id: LockId) -> Result<(), Status> {
        let Some(idx) = self.locks.iter().position(|l| l.lock_id == lock_id) else {
            return Err(Status::InvalidValue(format!("no partial lock {lock_id}")));
        };
        if self.locks[idx].sid != sid {
            return Err(Status::LockDenied(self.locks[idx].sid.0));
        }
        self.locks.remove(idx);
        info!(session = %sid, lock = %lock_id, "partial lock released");
        Ok(())
    }

    /// Drop every lock a dying session holds.
    pub fn release_session(&mut self, sid: SessionId) -> usize {
        let before = self.locks.len();
        self.locks.retain(|l| l.sid != sid);
        let dropped = before - self.locks.len();
        if dropped > 0 {
            debug!(session = %sid, dropped, "partial locks released on teardown");
        }
        dropped
    }

    /// True when `node` is inside some other session's lock set.
    pub fn blocked_for(&self, sid: SessionId, node: NodeId) -> Option<&PartialLock> {
        self.locks.iter().find(|l| l.sid != sid && l.covers(node))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartialLock> {
        self.locks.iter()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
#[path = "plock_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instrumentation module interface.
//!
//! Extensions back specific data subtrees with validate / apply /
//! commit / rollback callbacks. Statically registered and dynamically
//! loaded modules satisfy the same trait; the lifecycle controller
//! stores the handles and tears them down in reverse init order.
//!
//! An apply callback may return [`Outcome::Deferred`]; the owning
//! transaction parks until a completion record is posted back to the
//! engine. No nested event loops.

use indexmap::IndexMap;
use ncs_core::error::Status;
use ncs_core::id::TxId;
use ncs_core::value::{NodeId, ValueTree};
use ncs_core::xmlns::NsId;
use std::sync::Arc;

/// Phase a callback is being driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Apply,
    Commit,
    Rollback,
}

/// Result of one callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// The module will post a completion record for this transaction
    /// later; the transaction parks.
    Deferred,
}

/// Everything a callback may look at for one affected subtree.
pub struct HookContext<'a> {
    pub txid: TxId,
    /// Staged result tree (what the datastore will hold on commit).
    pub staged: &'a ValueTree,
    /// Affected subtree root within the staged tree, when it survives
    /// the edit; `None` for a whole-subtree delete.
    pub node: Option<NodeId>,
}

/// The four-method interface every instrumentation module implements.
pub trait Instrumentation: Send + Sync {
    fn validate(&self, ctx: &HookContext<'_>) -> Result<Outcome, Status> {
        let _ = ctx;
        Ok(Outcome::Ok)
    }

    fn apply(&self, ctx: &HookContext<'_>) -> Result<Outcome, Status> {
        let _ = ctx;
        Ok(Outcome::Ok)
    }

    fn commit(&self, ctx: &HookContext<'_>) -> Result<Outcome, Status> {
        let _ = ctx;
        Ok(Outcome::Ok)
    }

    fn rollback(&self, ctx: &HookContext<'_>) -> Result<Outcome, Status> {
        let _ = ctx;
        Ok(Outcome::Ok)
    }
}

/// Registry keyed by the `(namespace, top-element)` of the subtree a
/// module backs.
#[derive(Default)]
pub struct InstrumentRegistry {
    hooks: IndexMap<(NsId, String), Arc<dyn Instrumentation>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ns: NsId, top: impl Into<String>, hook: Arc<dyn Instrumentation>) {
        self.hooks.insert((ns, top.into()), hook);
    }

    pub fn lookup(&self, ns: NsId, top: &str) -> Option<Arc<dyn Instrumentation>> {
        self.hooks.get(&(ns, top.to_string())).cloned()
    }

    /// Teardown order is the reverse of registration order.
    pub fn drain_reverse(&mut self) -> Vec<(NsId, String)> {
        let keys: Vec<_> = self.hooks.keys().cloned().collect();
        self.hooks.clear();
        keys.into_iter().rev().collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry").field("hooks", &self.hooks.len()).finish()
    }
}

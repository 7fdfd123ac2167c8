// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NACM-style access control.
//!
//! Three decisions: rpc-allowed, notification-allowed and
//! data-access-allowed(read|write). The evaluator snapshots the rule
//! configuration from the running datastore into a per-message cache:
//! group membership and the ordered rule list, with data-rule XPath
//! programs pre-compiled and their node sets evaluated once per
//! message. A generation counter bumped on every NACM edit invalidates
//! stale caches. A superuser identity and the internal pseudo-session
//! short-circuit all checks.

use ncs_core::id::SessionId;
use ncs_core::value::{NodeId, ValueTree};
use ncs_core::xmlns::NsId;
use ncs_core::xpath::XPathProgram;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::profile::{AcmMode, Profile};

/// Requested access class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Exec,
}

/// Rule verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Permit,
    Deny,
}

/// Access classes one rule covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessOps {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl AccessOps {
    /// Parse the access-operations leaf: `*` or a space-separated list
    /// of read/create/update/delete/exec.
    pub fn parse(s: &str) -> AccessOps {
        if s.trim() == "*" {
            return AccessOps { read: true, write: true, exec: true };
        }
        let mut ops = AccessOps::default();
        for word in s.split_whitespace() {
            match word {
                "read" => ops.read = true,
                "create" | "update" | "delete" => ops.write = true,
                "exec" => ops.exec = true,
                _ => {}
            }
        }
        ops
    }

    pub fn covers(&self, access: Access) -> bool {
        match access {
            Access::Read => self.read,
            Access::Write => self.write,
            Access::Exec => self.exec,
        }
    }
}

/// What one rule matches on. A rule with neither path nor module scope
/// matches every request of its access classes.
#[derive(Debug)]
pub enum Matcher {
    Any,
    Module { module: String, rpc_name: Option<String> },
    Data { path: XPathProgram, last_result: Option<Vec<NodeId>> },
}

/// One rule, in rule-list document order.
#[derive(Debug)]
pub struct Rule {
    pub access: AccessOps,
    pub action: RuleAction,
    pub matcher: Matcher,
}

impl Rule {
    fn matches_data(&mut self, tree: &ValueTree, root: NodeId, node: NodeId) -> bool {
        match &mut self.matcher {
            Matcher::Any => true,
            Matcher::Module { .. } => false,
            Matcher::Data { path, last_result } => {
                if last_result.is_none() {
                    *last_result = Some(path.eval(tree, root));
                }
                let hits = last_result.as_deref().unwrap_or(&[]);
                if hits.contains(&node) {
                    return true;
                }
                // a rule covering an ancestor covers the subtree
                let mut cur = tree.node(node).and_then(|n| n.parent);
                while let Some(p) = cur {
                    if hits.contains(&p) {
                        return true;
                    }
                    cur = tree.node(p).and_then(|n| n.parent);
                }
                false
            }
        }
    }

    fn matches_rpc(&self, module: &str, rpc_name: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Data { .. } => false,
            Matcher::Module { module: m, rpc_name: r } => {
                if m != "*" && m != module {
                    return false;
                }
                match r {
                    Some(want) => want == "*" || want == rpc_name,
                    None => true,
                }
            }
        }
    }

    fn matches_notification(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Data { .. } => false,
            Matcher::Module { rpc_name, .. } => match rpc_name {
                Some(want) => want == "*" || want == name,
                None => true,
            },
        }
    }
}

/// Per-message view of the access-control configuration.
#[derive(Debug)]
pub struct AcmCache {
    pub generation: u64,
    pub enabled: bool,
    pub groups: Vec<String>,
    pub rules: Vec<Rule>,
    pub read_default: RuleAction,
    pub write_default: RuleAction,
    pub exec_default: RuleAction,
}

impl AcmCache {
    fn defaults() -> Self {
        Self {
            generation: 0,
            enabled: true,
            groups: Vec::new(),
            rules: Vec::new(),
            read_default: RuleAction::Permit,
            write_default: RuleAction::Deny,
            exec_default: RuleAction::Permit,
        }
    }
}

/// The evaluator plus its per-session cache table.
#[derive(Debug, Default)]
pub struct AcmState {
    /// Bumped on every NACM configuration edit.
    pub generation: u64,
    caches: HashMap<SessionId, AcmCache>,
}

impl AcmState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate_all(&mut self) {
        self.generation += 1;
        self.caches.clear();
    }

    pub fn forget_session(&mut self, sid: SessionId) {
        self.caches.remove(&sid);
    }

    fn cache_for(
        &mut self,
        sid: SessionId,
        user: &str,
        tree: &ValueTree,
        root: NodeId,
        nacm_ns: NsId,
    ) -> &mut AcmCache {
        let generation = self.generation;
        let stale =
            self.caches.get(&sid).map(|c| c.generation != generation).unwrap_or(true);
        if stale {
            let cache = build_cache(user, tree, root, nacm_ns, generation);
            self.caches.insert(sid, cache);
        }
        self.caches.entry(sid).or_insert_with(AcmCache::defaults)
    }

    /// May `user` invoke the RPC `(module, name)`?
    #[allow(clippy::too_many_arguments)]
    pub fn rpc_allowed(
        &mut self,
        profile: &Profile,
        sid: SessionId,
        user: &str,
        tree: &ValueTree,
        root: NodeId,
        nacm_ns: NsId,
        module: &str,
        rpc_name: &str,
    ) -> bool {
        if bypass(profile, sid, user) {
            return true;
        }
        let cache = self.cache_for(sid, user, tree, root, nacm_ns);
        if !cache.enabled {
            return true;
        }
        let mut decision = None;
        for rule in &cache.rules {
            if rule.access.covers(Access::Exec) && rule.matches_rpc(module, rpc_name) {
                decision = Some(rule.action);
                break;
            }
        }
        // close-session may never be locked out
        if rpc_name == "close-session" {
            return true;
        }
        let permit = decision.unwrap_or(cache.exec_default) == RuleAction::Permit;
        if !permit {
            log_denial(profile, user, Access::Exec);
        }
        permit || !enforced(profile)
    }

    /// May `user` read or write the data node?
    #[allow(clippy::too_many_arguments)]
    pub fn data_allowed(
        &mut self,
        profile: &Profile,
        sid: SessionId,
        user: &str,
        tree: &ValueTree,
        root: NodeId,
        nacm_ns: NsId,
        node: NodeId,
        access: Access,
    ) -> bool {
        if bypass(profile, sid, user) {
            return true;
        }
        let cache = self.cache_for(sid, user, tree, root, nacm_ns);
        if !cache.enabled {
            return true;
        }
        let mut decision = None;
        for rule in cache.rules.iter_mut() {
            if !rule.access.covers(access) {
                continue;
            }
            if rule.matches_data(tree, root, node) {
                decision = Some(rule.action);
                break;
            }
        }
        let action = decision.unwrap_or(match access {
            Access::Read => cache.read_default,
            Access::Write | Access::Exec => cache.write_default,
        });
        let permit = action == RuleAction::Permit;
        if !permit {
            log_denial(profile, user, access);
        }
        permit || !enforced(profile)
    }

    /// May `user` receive the notification `name`?
    #[allow(clippy::too_many_arguments)]
    pub fn notification_allowed(
        &mut self,
        profile: &Profile,
        sid: SessionId,
        user: &str,
        tree: &ValueTree,
        root: NodeId,
        nacm_ns: NsId,
        name: &str,
    ) -> bool {
        if bypass(profile, sid, user) {
            return true;
        }
        let cache = self.cache_for(sid, user, tree, root, nacm_ns);
        if !cache.enabled {
            return true;
        }
        let mut decision = None;
        for rule in &cache.rules {
            if rule.access.covers(Access::Read) && rule.matches_notification(name) {
                decision = Some(rule.action);
                break;
            }
        }
        let permit = decision.unwrap_or(cache.read_default) == RuleAction::Permit;
        permit || !enforced(profile)
    }
}

/// Only the enforcing mode turns a deny verdict into a refusal; warn
/// and permissive evaluate and log but let the request through.
fn enforced(profile: &Profile) -> bool {
    profile.acm_mode == AcmMode::Enforcing
}

fn bypass(profile: &Profile, sid: SessionId, user: &str) -> bool {
    if profile.acm_mode == AcmMode::Off {
        return true;
    }
    if sid.is_internal() {
        return true;
    }
    profile.superuser.as_deref() == Some(user)
}

fn log_denial(profile: &Profile, user: &str, access: Access) {
    match access {
        Access::Read if profile.log_acm_reads => {
            debug!(user, "read access denied");
        }
        Access::Write | Access::Exec if profile.log_acm_writes => {
            warn!(user, "write access denied");
        }
        _ => {}
    }
}

/// Snapshot the /nacm subtree into a cache for `user`.
fn build_cache(
    user: &str,
    tree: &ValueTree,
    root: NodeId,
    nacm_ns: NsId,
    generation: u64,
) -> AcmCache {
    let mut cache = AcmCache { generation, ..AcmCache::defaults() };
    let Some(nacm) = tree.find_child(root, nacm_ns, "nacm") else {
        // nothing configured: nothing to enforce until the subtree
        // first appears
        cache.enabled = false;
        return cache;
    };

    if let Some(v) = tree.child_leaf_value(nacm, "enable-nacm") {
        cache.enabled = v != "false";
    }
    if let Some(v) = tree.child_leaf_value(nacm, "read-default") {
        cache.read_default = parse_action(v, RuleAction::Permit);
    }
    if let Some(v) = tree.child_leaf_value(nacm, "write-default") {
        cache.write_default = parse_action(v, RuleAction::Deny);
    }
    if let Some(v) = tree.child_leaf_value(nacm, "exec-default") {
        cache.exec_default = parse_action(v, RuleAction::Permit);
    }

    // group membership
    if let Some(groups) = tree.find_child(nacm, nacm_ns, "groups") {
        for group in tree.find_children(groups, nacm_ns, "group") {
            let Some(name) = tree.child_leaf_value(group, "name") else { continue };
            let members = tree.find_children(group, nacm_ns, "user-name");
            let is_member = members
                .iter()
                .any(|m| tree.node(*m).and_then(|n| n.leaf_value()).is_some_and(|v| v == user));
            if is_member {
                cache.groups.push(name.to_string());
            }
        }
    }

    // rule lists in document order; only lists naming one of the user's
    // groups (or *) contribute
    for rule_list in tree.find_children(nacm, nacm_ns, "rule-list") {
        let applies = tree.find_children(rule_list, nacm_ns, "group").iter().any(|g| {
            tree.node(*g)
                .and_then(|n| n.leaf_value())
                .is_some_and(|v| v == "*" || cache.groups.iter().any(|m| m == v))
        });
        if !applies {
            continue;
        }
        for rule in tree.find_children(rule_list, nacm_ns, "rule") {
            let access = tree
                .child_leaf_value(rule, "access-operations")
                .map(AccessOps::parse)
                .unwrap_or(AccessOps { read: true, write: true, exec: true });
            let action = tree
                .child_leaf_value(rule, "action")
                .map(|v| parse_action(v, RuleAction::Deny))
                .unwrap_or(RuleAction::Deny);
            let matcher = if let Some(path) = tree.child_leaf_value(rule, "path") {
                match XPathProgram::compile(path, &|_| None) {
                    Ok(prog) => Matcher::Data { path: prog, last_result: None },
                    Err(_) => continue,
                }
            } else {
                let module = tree.child_leaf_value(rule, "module-name");
                let rpc_name = tree.child_leaf_value(rule, "rpc-name").map(str::to_string);
                match (module, &rpc_name) {
                    (None, None) => Matcher::Any,
                    (m, _) => Matcher::Module {
                        module: m.unwrap_or("*").to_string(),
                        rpc_name,
                    },
                }
            };
            cache.rules.push(Rule { access, action, matcher });
        }
    }
    cache
}

fn parse_action(s: &str, fallback: RuleAction) -> RuleAction {
    match s {
        "permit" => RuleAction::Permit,
        "deny" => RuleAction::Deny,
        _ => fallback,
    }
}

#[cfg(test)]
#[path = "acm_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The explicit server context.
//!
//! All process-wide state lives here and is passed to every entry
//! point: namespace and schema registries, datastores, the session
//! table, access control, partial locks, the event log and the
//! transaction counter. The state behind the mutex is only held across
//! synchronous message processing, never across await points.

use chrono::{DateTime, Utc};
use ncs_core::caps::{self, CapabilitySet};
use ncs_core::id::{SessionId, TxId};
use ncs_core::schema::{LeafType, ModuleBuilder, ModuleInfo, SchemaRegistry};
use ncs_core::xmlns::{NsId, NsRegistry, WellKnown};
use ncs_store::{Datastore, DatastoreName, TxIdFile};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::acm::AcmState;
use crate::instrument::InstrumentRegistry;
use crate::notif::{EventLog, Notification};
use crate::plock::PartialLockRegistry;
use crate::profile::Profile;
use crate::session::SessionRegistry;
use crate::txn::confirm::ConfirmState;
use crate::txn::ParkedTransaction;

/// Shutdown request mode set by the signal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Exit,
    Reset,
}

/// Everything mutable, guarded by one lock.
pub struct ServerState {
    pub ns: NsRegistry,
    pub wk: WellKnown,
    pub schema: SchemaRegistry,
    pub caps: CapabilitySet,
    pub running: Datastore,
    pub candidate: Option<Datastore>,
    pub startup: Option<Datastore>,
    pub sessions: SessionRegistry,
    pub plocks: PartialLockRegistry,
    pub acm: AcmState,
    pub eventlog: EventLog,
    pub instruments: InstrumentRegistry,
    pub tx_counter: TxId,
    pub txid_file: Option<TxIdFile>,
    pub confirm: Option<ConfirmState>,
    pub parked: Vec<ParkedTransaction>,
}

impl ServerState {
    /// Construct with registries seeded and built-in modules compiled.
    pub fn new(profile: &Profile) -> Self {
        let mut ns = NsRegistry::new();
        let wk = ns.register_well_known();
        let mut schema = SchemaRegistry::new();
        register_builtin_modules(&mut schema, &wk);
        let caps = build_caps(profile);

        let mut state = Self {
            ns,
            wk,
            schema,
            caps,
            running: Datastore::new(DatastoreName::Running),
            candidate: None,
            startup: None,
            sessions: SessionRegistry::new(),
            plocks: PartialLockRegistry::new(),
            acm: AcmState::new(),
            eventlog: EventLog::new(profile.eventlog_size),
            instruments: InstrumentRegistry::new(),
            tx_counter: TxId(0),
            txid_file: None,
            confirm: None,
            parked: Vec::new(),
        };
        if profile.has_candidate() {
            state.candidate = Some(Datastore::new(DatastoreName::Candidate));
        }
        if profile.has_startup() {
            state.startup = Some(Datastore::new(DatastoreName::Startup));
        }
        state
    }

    pub fn datastore(&self, name: DatastoreName) -> Option<&Datastore> {
        match name {
            DatastoreName::Running => Some(&self.running),
            DatastoreName::Candidate => self.candidate.as_ref(),
            DatastoreName::Startup => self.startup.as_ref(),
        }
    }

    pub fn datastore_mut(&mut self, name: DatastoreName) -> Option<&mut Datastore> {
        match name {
            DatastoreName::Running => Some(&mut self.running),
            DatastoreName::Candidate => self.candidate.as_mut(),
            DatastoreName::Startup => self.startup.as_mut(),
        }
    }

    /// Snapshot of the namespace table usable as a `'static` lookup for
    /// the XML reader.
    pub fn ns_lookup(&self) -> impl Fn(&str) -> NsId + Send + Clone + 'static {
        let mut table: HashMap<String, NsId> = HashMap::new();
        for idx in 1..=self.ns.len() as u32 {
            let id = NsId(idx);
            if let Some(uri) = self.ns.uri(id) {
                table.insert(uri.to_string(), id);
            }
        }
        let table = Arc::new(table);
        move |uri: &str| table.get(uri).copied().unwrap_or(NsId::INVALID)
    }

    /// Append to the event log and queue for every subscribed session
    /// that may see the event; queued entries drain max-burst at a time.
    pub fn publish(&mut self, profile: &Profile, notif: Notification) {
        let name = notif.kind.element_name().to_string();
        let running_root = self.running.root();
        // split borrows: serialize first, then walk sessions
        let xml = notif.to_xml(&self.ns, self.wk.ncn, self.wk.sys);
        self.eventlog.push(notif);

        let nacm_ns = self.wk.nacm;
        let deliveries: Vec<SessionId> =
            self.sessions.iter().filter(|s| s.subscribed).map(|s| s.sid).collect();
        for sid in deliveries {
            let user = self
                .sessions
                .get(sid)
                .map(|s| s.username().to_string())
                .unwrap_or_default();
            let allowed = self.acm.notification_allowed(
                profile,
                sid,
                &user,
                self.running.tree(),
                running_root,
                nacm_ns,
                &name,
            );
            if !allowed {
                continue;
            }
            if let Some(sess) = self.sessions.get_mut(sid) {
                sess.pending_notifs.push_back(xml.clone());
            }
        }
        debug!(event = %name, "notification published");
        self.drain_notifications(profile);
    }

    /// Flush queued notifications, at most max-burst per session per
    /// pass; the timer service sweeps up leftovers.
    pub fn drain_notifications(&mut self, profile: &Profile) {
        for sess in self.sessions.iter_mut() {
            let mut sent = 0usize;
            while sent < profile.max_burst {
                let Some(doc) = sess.pending_notifs.pop_front() else { break };
                sess.send(doc.as_bytes());
                sess.counters.out_notifications += 1;
                sent += 1;
            }
        }
    }

    /// Next transaction id without committing it.
    pub fn peek_next_txid(&self) -> TxId {
        self.tx_counter.next()
    }
}

/// Immutable wrapper shared by the listener, timers and signals.
pub struct Server {
    pub profile: Profile,
    pub state: Mutex<ServerState>,
    /// RPC handler table keyed by `(namespace, local-name)`, populated
    /// once at module registration.
    pub op_table: indexmap::IndexMap<(NsId, String), crate::ops::Handler>,
    pub started_at: DateTime<Utc>,
    shutdown_flag: AtomicBool,
    shutdown_mode: Mutex<Option<ShutdownMode>>,
    pub shutdown_notify: Notify,
    /// Cancelled on shutdown so per-connection tasks unwind.
    pub conn_cancel: CancellationToken,
}

impl Server {
    pub fn new(profile: Profile, state: ServerState) -> Arc<Self> {
        let op_table = crate::ops::build_op_table(&state.wk);
        Arc::new(Self {
            profile,
            state: Mutex::new(state),
            op_table,
            started_at: Utc::now(),
            shutdown_flag: AtomicBool::new(false),
            shutdown_mode: Mutex::new(None),
            shutdown_notify: Notify::new(),
            conn_cancel: CancellationToken::new(),
        })
    }

    pub fn request_shutdown(&self, mode: ShutdownMode) {
        info!(?mode, "shutdown requested");
        *self.shutdown_mode.lock() = Some(mode);
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.conn_cancel.cancel();
        self.shutdown_notify.notify_waiters();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    pub fn shutdown_mode(&self) -> Option<ShutdownMode> {
        *self.shutdown_mode.lock()
    }

    /// Entry point for instrumentation modules posting the completion
    /// record of a deferred apply: the parked transaction resumes on
    /// the caller's context, commits (or rolls back) and replies.
    pub fn complete_transaction(&self, txid: TxId, result: Result<(), ncs_core::error::Status>) {
        let mut state = self.state.lock();
        if let Some((parked, commit)) =
            crate::txn::complete_parked(&mut state, &self.profile, txid, result)
        {
            crate::dispatch::reply_for_parked(&mut state, parked, commit);
        }
    }
}

/// Advertised capability set for this profile.
fn build_caps(profile: &Profile) -> CapabilitySet {
    let mut set = CapabilitySet::new();
    set.add(caps::CAP_BASE_10);
    set.add(caps::CAP_BASE_11);
    if profile.has_candidate() {
        set.add(caps::CAP_CANDIDATE);
        set.add(caps::CAP_CONFIRMED_COMMIT);
    }
    if profile.has_startup() {
        set.add(caps::CAP_STARTUP);
    }
    set.add(caps::CAP_ROLLBACK_ON_ERROR);
    set.add(caps::CAP_VALIDATE);
    set.add(caps::CAP_XPATH);
    set.add(caps::CAP_NOTIFICATION);
    set.add(caps::CAP_PARTIAL_LOCK);
    set.add(caps::CAP_WITH_DEFAULTS);
    set
}

/// Compile the built-in schema modules: system configuration, NACM and
/// the read-only netconf-state monitoring tree.
fn register_builtin_modules(schema: &mut SchemaRegistry, wk: &WellKnown) {
    // system module
    let mut b = ModuleBuilder::new(
        schema,
        wk.sys,
        ModuleInfo {
            name: "system".into(),
            ns: wk.sys,
            prefix: "sys".into(),
            revision: Some("2026-06-01".into()),
        },
    );
    let system = b.container(None, "system", false);
    b.leaf(Some(system), "hostname", LeafType::String);
    b.leaf(Some(system), "location", LeafType::String);
    b.leaf(Some(system), "contact", LeafType::String);
    b.leaf_with_default(Some(system), "mtu", LeafType::Uint32, "1500");
    let user = b.list(Some(system), "user", &["name"]);
    b.mandatory_leaf(Some(user), "name", LeafType::String);
    b.leaf(Some(user), "shell", LeafType::String);
    b.leaf_list(Some(user), "group", LeafType::String);

    // NACM module
    let mut b = ModuleBuilder::new(
        schema,
        wk.nacm,
        ModuleInfo {
            name: "ietf-netconf-acm".into(),
            ns: wk.nacm,
            prefix: "nacm".into(),
            revision: Some("2018-02-14".into()),
        },
    );
    let nacm = b.container(None, "nacm", false);
    b.leaf_with_default(Some(nacm), "enable-nacm", LeafType::Boolean, "true");
    b.leaf_with_default(
        Some(nacm),
        "read-default",
        LeafType::Enumeration(vec!["permit".into(), "deny".into()]),
        "permit",
    );
    b.leaf_with_default(
        Some(nacm),
        "write-default",
        LeafType::Enumeration(vec!["permit".into(), "deny".into()]),
        "deny",
    );
    b.leaf_with_default(
        Some(nacm),
        "exec-default",
        LeafType::Enumeration(vec!["permit".into(), "deny".into()]),
        "permit",
    );
    let groups = b.container(Some(nacm), "groups", false);
    let group = b.list(Some(groups), "group", &["name"]);
    b.mandatory_leaf(Some(group), "name", LeafType::String);
    b.leaf_list(Some(group), "user-name", LeafType::String);
    let rule_list = b.list(Some(nacm), "rule-list", &["name"]);
    b.mandatory_leaf(Some(rule_list), "name", LeafType::String);
    b.leaf_list(Some(rule_list), "group", LeafType::String);
    let rule = b.list(Some(rule_list), "rule", &["name"]);
    b.mandatory_leaf(Some(rule), "name", LeafType::String);
    b.leaf(Some(rule), "module-name", LeafType::String);
    b.leaf(Some(rule), "rpc-name", LeafType::String);
    b.leaf(Some(rule), "path", LeafType::String);
    b.leaf(Some(rule), "access-operations", LeafType::String);
    b.leaf(
        Some(rule),
        "action",
        LeafType::Enumeration(vec!["permit".into(), "deny".into()]),
    );

    // netconf-state monitoring (read-only virtual data)
    let mut b = ModuleBuilder::new(
        schema,
        wk.ncm,
        ModuleInfo {
            name: "ietf-netconf-monitoring".into(),
            ns: wk.ncm,
            prefix: "ncm".into(),
            revision: Some("2010-10-04".into()),
        },
    );
    let ncstate = b.state_container(None, "netconf-state");
    let sessions = b.state_container(Some(ncstate), "sessions");
    let session = b.list(Some(sessions), "session", &["session-id"]);
    b.mandatory_leaf(Some(session), "session-id", LeafType::Uint32);
    b.leaf(Some(session), "username", LeafType::String);
    b.leaf(Some(session), "source-host", LeafType::String);
    b.leaf(Some(session), "transport", LeafType::String);
    b.leaf(Some(session), "login-time", LeafType::String);
    b.leaf(Some(session), "in-rpcs", LeafType::Uint32);
    b.leaf(Some(session), "in-bad-rpcs", LeafType::Uint32);
    b.leaf(Some(session), "out-rpc-errors", LeafType::Uint32);
    b.leaf(Some(session), "out-notifications", LeafType::Uint32);
    let stats = b.state_container(Some(ncstate), "statistics");
    b.leaf(Some(stats), "active-sessions", LeafType::Uint32);
    b.leaf(Some(stats), "in-rpcs", LeafType::Uint32);
    b.leaf(Some(stats), "in-bad-rpcs", LeafType::Uint32);
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

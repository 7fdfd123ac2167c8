// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! XML namespace registry.
//!
//! Assigns small integer ids to namespace URIs on first registration and
//! resolves both directions. The mapping is append-only for the process
//! lifetime, so ids handed out to sessions and schema templates stay
//! stable. Id 0 means "no namespace"; [`NsId::INVALID`] is reserved for
//! URIs the peer sent that the server does not know, so the error report
//! can round-trip them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// NETCONF base protocol namespace.
pub const NC_URI: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
/// Notifications 1.0 namespace.
pub const NCN_URI: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";
/// NETCONF notification event stream content namespace.
pub const NCEVENT_URI: &str = "urn:ietf:params:xml:ns:netmod:notification";
/// NACM access-control namespace.
pub const NACM_URI: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-acm";
/// Partial-lock extension namespace.
pub const PLOCK_URI: &str = "urn:ietf:params:xml:ns:netconf:partial-lock:1.0";
/// with-defaults extension namespace.
pub const WD_URI: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults";
/// netconf-state monitoring namespace.
pub const NCM_URI: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";
/// Local connect-handshake namespace for the socket transport.
pub const NCX_URI: &str = "http://netconfcentral.org/ns/netconfd";
/// System notification content namespace.
pub const SYS_URI: &str = "http://netconfcentral.org/ns/system";

/// Small integer namespace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NsId(pub u32);

impl NsId {
    /// No namespace (unqualified name).
    pub const NONE: NsId = NsId(0);
    /// Unknown URI sent by a peer; kept distinct so errors can name it.
    pub const INVALID: NsId = NsId(u32::MAX);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_invalid(&self) -> bool {
        *self == NsId::INVALID
    }
}

impl fmt::Display for NsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry for one registered namespace.
#[derive(Debug, Clone)]
struct NsEntry {
    uri: String,
    /// Canonical prefix for generated XML (the owning module name).
    prefix: String,
}

/// Process-wide namespace URI registry.
///
/// Owned by the server context; ids are assigned in registration order
/// starting at 1 and never reused.
#[derive(Debug, Default)]
pub struct NsRegistry {
    entries: Vec<NsEntry>,
    by_uri: IndexMap<String, NsId>,
}

/// Ids of the namespaces every server instance registers at boot.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub nc: NsId,
    pub ncn: NsId,
    pub ncevent: NsId,
    pub nacm: NsId,
    pub plock: NsId,
    pub wd: NsId,
    pub ncm: NsId,
    pub ncx: NsId,
    pub sys: NsId,
}

impl NsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the namespaces the protocol engine itself depends on.
    pub fn register_well_known(&mut self) -> WellKnown {
        WellKnown {
            nc: self.register(NC_URI, "nc"),
            ncn: self.register(NCN_URI, "ncn"),
            ncevent: self.register(NCEVENT_URI, "ncevent"),
            nacm: self.register(NACM_URI, "nacm"),
            plock: self.register(PLOCK_URI, "pl"),
            wd: self.register(WD_URI, "wd"),
            ncm: self.register(NCM_URI, "ncm"),
            ncx: self.register(NCX_URI, "ncx"),
            sys: self.register(SYS_URI, "sys"),
        }
    }

    /// Register a URI, returning the existing id if already present.
    pub fn register(&mut self, uri: &str, prefix: &str) -> NsId {
        if let Some(id) = self.by_uri.get(uri) {
            return *id;
        }
        let id = NsId(self.entries.len() as u32 + 1);
        self.entries.push(NsEntry { uri: uri.to_string(), prefix: prefix.to_string() });
        self.by_uri.insert(uri.to_string(), id);
        id
    }

    /// Resolve a URI to its id, or [`NsId::INVALID`] for unknown URIs.
    pub fn lookup(&self, uri: &str) -> NsId {
        self.by_uri.get(uri).copied().unwrap_or(NsId::INVALID)
    }

    pub fn uri(&self, id: NsId) -> Option<&str> {
        if id.is_none() || id.is_invalid() {
            return None;
        }
        self.entries.get(id.0 as usize - 1).map(|e| e.uri.as_str())
    }

    /// Canonical prefix owned by the module that registered the URI.
    pub fn prefix(&self, id: NsId) -> Option<&str> {
        if id.is_none() || id.is_invalid() {
            return None;
        }
        self.entries.get(id.0 as usize - 1).map(|e| e.prefix.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "xmlns_tests.rs"]
mod tests;

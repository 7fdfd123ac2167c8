// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol capabilities advertised in `<hello>`.

use std::fmt;

pub const CAP_BASE_10: &str = "urn:ietf:params:netconf:base:1.0";
pub const CAP_BASE_11: &str = "urn:ietf:params:netconf:base:1.1";
pub const CAP_CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
pub const CAP_CONFIRMED_COMMIT: &str = "urn:ietf:params:netconf:capability:confirmed-commit:1.1";
pub const CAP_ROLLBACK_ON_ERROR: &str = "urn:ietf:params:netconf:capability:rollback-on-error:1.0";
pub const CAP_VALIDATE: &str = "urn:ietf:params:netconf:capability:validate:1.1";
pub const CAP_STARTUP: &str = "urn:ietf:params:netconf:capability:startup:1.0";
pub const CAP_URL: &str = "urn:ietf:params:netconf:capability:url:1.0?scheme=file";
pub const CAP_XPATH: &str = "urn:ietf:params:netconf:capability:xpath:1.0";
pub const CAP_NOTIFICATION: &str = "urn:ietf:params:netconf:capability:notification:1.0";
pub const CAP_PARTIAL_LOCK: &str = "urn:ietf:params:netconf:capability:partial-lock:1.0";
pub const CAP_WITH_DEFAULTS: &str = "urn:ietf:params:netconf:capability:with-defaults:1.0\
?basic-mode=explicit&also-supported=report-all,report-all-tagged,trim";

/// NETCONF protocol version, derived from the base capability URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Protocol {
    Base10,
    Base11,
}

impl Protocol {
    pub fn capability_uri(&self) -> &'static str {
        match self {
            Protocol::Base10 => CAP_BASE_10,
            Protocol::Base11 => CAP_BASE_11,
        }
    }

    pub fn from_capability(uri: &str) -> Option<Protocol> {
        match uri {
            CAP_BASE_10 => Some(Protocol::Base10),
            CAP_BASE_11 => Some(Protocol::Base11),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Base10 => write!(f, "base:1.0"),
            Protocol::Base11 => write!(f, "base:1.1"),
        }
    }
}

/// One advertised capability URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability(pub String);

/// Ordered set of capability URIs for one side of a session.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    uris: Vec<String>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        if !self.uris.iter().any(|u| *u == uri) {
            self.uris.push(uri);
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.uris.iter().any(|u| u == uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.uris.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Protocol versions present in this set.
    pub fn protocols(&self) -> Vec<Protocol> {
        self.uris.iter().filter_map(|u| Protocol::from_capability(u)).collect()
    }

    /// Highest protocol version supported by both sets, if any.
    pub fn negotiate(&self, peer: &CapabilitySet) -> Option<Protocol> {
        let mine = self.protocols();
        let mut common: Vec<Protocol> =
            peer.protocols().into_iter().filter(|p| mine.contains(p)).collect();
        common.sort();
        common.pop()
    }
}

#[cfg(test)]
#[path = "caps_tests.rs"]
mod tests;

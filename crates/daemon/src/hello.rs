// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<hello>` exchange.
//!
//! The server sends its hello (capabilities + session-id) right after a
//! successful connect handshake. The client's hello picks the protocol:
//! the highest version both sides advertise wins, and the session
//! framing switches to chunked for base:1.1. An empty intersection
//! drops the session.

use ncs_core::caps::{CapabilitySet, Protocol};
use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_wire::framing::FramingMode;
use ncs_wire::reader::{XmlEvent, XmlReader};
use ncs_wire::writer::XmlWriter;
use tracing::{debug, info};

use crate::server::ServerState;
use crate::session::Instate;

/// Build the server `<hello>` document for a session.
pub fn server_hello(state: &ServerState, sid: SessionId) -> String {
    let nc = state.wk.nc;
    let mut w = XmlWriter::new(&state.ns);
    w.start_element(nc, "hello");
    w.start_element(nc, "capabilities");
    for cap in state.caps.iter() {
        w.leaf_element(nc, "capability", cap);
    }
    w.end_element();
    w.leaf_element(nc, "session-id", &sid.to_string());
    w.end_element();
    w.finish()
}

/// Process a client `<hello>`: record capabilities, negotiate the
/// protocol version, advance to idle.
pub fn handle_client_hello(
    state: &mut ServerState,
    sid: SessionId,
    reader: &mut XmlReader,
    hello_empty: bool,
) -> Result<(), Status> {
    let instate = state.sessions.get(sid).map(|s| s.instate);
    if instate != Some(Instate::HelloWait) {
        return Err(Status::NoAccessState);
    }
    if hello_empty {
        return Err(Status::MissingElement("capabilities".to_string()));
    }

    let mut caps = CapabilitySet::new();
    let mut in_capability = false;
    loop {
        match reader.next_event().map_err(|e| Status::XmlMalformed(e.to_string()))? {
            XmlEvent::Start { name, .. } => {
                in_capability = name == "capability";
            }
            XmlEvent::Text(t) => {
                if in_capability {
                    caps.add(t.trim().to_string());
                }
            }
            XmlEvent::End { .. } => in_capability = false,
            XmlEvent::Empty { .. } => {}
            XmlEvent::Eof => break,
        }
    }
    if caps.is_empty() {
        return Err(Status::MissingElement("capabilities".to_string()));
    }

    let negotiated = state.caps.negotiate(&caps);
    let Some(protocol) = negotiated else {
        info!(session = %sid, "no common protocol version, dropping");
        return Err(Status::WrongVersion);
    };

    let Some(sess) = state.sessions.get_mut(sid) else {
        return Err(Status::Internal("session vanished".to_string()));
    };
    sess.client_caps = caps;
    sess.protocol = Some(protocol);
    if protocol == Protocol::Base11 {
        sess.set_framing(FramingMode::Chunked);
    }
    sess.instate = Instate::Idle;
    debug!(session = %sid, %protocol, "hello complete");
    Ok(())
}

#[cfg(test)]
#[path = "hello_tests.rs"]
mod tests;

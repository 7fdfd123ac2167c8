// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<ncx-connect>` handshake for the local transport.
//!
//! The transport front-end (SSH subsystem shim or local client) opens
//! the byte stream and announces itself with a single empty element.
//! Attribute checks run in a fixed order: version, magic token,
//! transport (+ port allowlist for ssh), user, address. Any failure
//! closes the session with bad-start; success advances to hello-wait,
//! sends the server hello and announces sysSessionStart.

use chrono::Utc;
use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_wire::reader::XmlAttr;
use tracing::{debug, info};

use crate::env::SERVER_VERSION;
use crate::hello;
use crate::notif::{EventKind, Notification};
use crate::profile::Profile;
use crate::server::ServerState;
use crate::session::{Instate, Transport};

/// Validate the handshake and promote the session. The caller tears
/// the session down on any error.
pub fn handle_connect(
    state: &mut ServerState,
    profile: &Profile,
    sid: SessionId,
    attrs: &[XmlAttr],
    empty: bool,
) -> Result<(), Status> {
    // only an empty element, and only in the init state
    if !empty {
        return Err(Status::BadElement("ncx-connect".to_string()));
    }
    let instate = state.sessions.get(sid).map(|s| s.instate);
    if instate != Some(Instate::Init) {
        return Err(Status::NoAccessState);
    }

    let attr = |name: &str| attrs.iter().find(|a| a.name == name).map(|a| a.value.as_str());

    // version
    let version = attr("version").ok_or_else(|| Status::MissingAttribute("version".into()))?;
    let version: u32 =
        version.parse().map_err(|_| Status::BadAttribute("version".to_string()))?;
    if version != SERVER_VERSION {
        return Err(Status::WrongVersion);
    }

    // magic token
    let magic = attr("magic").ok_or_else(|| Status::MissingAttribute("magic".into()))?;
    if magic != profile.magic_token {
        return Err(Status::AccessDenied);
    }

    // transport; ssh connections must name an allowed port
    let transport = attr("transport")
        .ok_or_else(|| Status::MissingAttribute("transport".into()))?;
    let transport = match transport {
        "ssh" => {
            let port = attr("port").ok_or_else(|| Status::MissingAttribute("port".into()))?;
            let port: u16 =
                port.parse().map_err(|_| Status::BadAttribute("port".to_string()))?;
            if !profile.ssh_port_allowed(port) {
                return Err(Status::AccessDenied);
            }
            Transport::Ssh
        }
        "local" => Transport::Local,
        _ => return Err(Status::AccessDenied),
    };

    let user = attr("user").ok_or_else(|| Status::MissingAttribute("user".into()))?.to_string();
    let address =
        attr("address").ok_or_else(|| Status::MissingAttribute("address".into()))?.to_string();

    {
        let Some(sess) = state.sessions.get_mut(sid) else {
            return Err(Status::Internal("session vanished".to_string()));
        };
        sess.user = Some(user.clone());
        sess.peer = Some(address.clone());
        sess.transport = Some(transport);
        sess.instate = Instate::HelloWait;
    }

    // server hello goes out before any client message is processed
    let hello_doc = hello::server_hello(state, sid);
    if let Some(sess) = state.sessions.get(sid) {
        sess.send(hello_doc.as_bytes());
    }

    info!(session = %sid, user = %user, peer = %address, transport = transport.as_str(),
          "session connected");
    state.publish(
        profile,
        Notification {
            time: Utc::now(),
            kind: EventKind::SessionStart { sid, user, peer: address },
        },
    );
    debug!(session = %sid, "connect handshake ok");
    Ok(())
}

#[cfg(test)]
#[path = "connect_tests.rs"]
mod tests;

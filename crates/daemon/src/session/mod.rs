// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session state and the bounded session registry.
//!
//! Sessions are identified by small integers drawn from a fixed pool;
//! ids are reused only after the slot is released, with a wrap-around
//! scan once the dispenser reaches the cap. Session 0 is reserved for
//! server-internal configuration edits.

use chrono::{DateTime, Utc};
use ncs_core::caps::{CapabilitySet, Protocol};
use std::collections::VecDeque;
use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_store::WithDefaults;
use ncs_wire::framing::{FrameDecoder, FrameEncoder, FramingMode};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Hard cap on concurrent sessions, slot 0 included.
pub const MAX_SESSIONS: usize = 1024;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instate {
    Init,
    HelloWait,
    Idle,
    InMsg,
    ShutdownReq,
    Shutdown,
}

/// Transport named in the connect handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ssh,
    Local,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Ssh => "ssh",
            Transport::Local => "local",
        }
    }
}

/// Why a session ended, for the sysSessionEnd notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Closed,
    Killed(SessionId),
    Timeout,
    BadStart,
    BadHello,
    Other,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Closed => "closed",
            DropReason::Killed(_) => "killed",
            DropReason::Timeout => "timeout",
            DropReason::BadStart => "bad-start",
            DropReason::BadHello => "bad-hello",
            DropReason::Other => "other",
        }
    }
}

/// Cumulative per-session counters, exposed through netconf-state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounters {
    pub in_rpcs: u64,
    pub bad_rpcs: u64,
    pub out_rpc_errors: u64,
    pub out_notifications: u64,
}

/// Display parameters settable via set-my-session.
#[derive(Debug, Clone)]
pub struct DisplayParams {
    pub linesize: u32,
    pub indent: u32,
    pub with_defaults: Option<WithDefaults>,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self { linesize: 72, indent: 1, with_defaults: None }
    }
}

/// Bytes or a teardown order for the connection writer task.
#[derive(Debug)]
pub enum SessionOutput {
    Msg(Vec<u8>),
    Close,
}

/// One client session.
#[derive(Debug)]
pub struct Session {
    pub sid: SessionId,
    pub instate: Instate,
    pub user: Option<String>,
    pub peer: Option<String>,
    pub transport: Option<Transport>,
    pub protocol: Option<Protocol>,
    pub decoder: FrameDecoder,
    pub encoder: FrameEncoder,
    pub client_caps: CapabilitySet,
    pub counters: SessionCounters,
    pub started_at: DateTime<Utc>,
    pub last_rpc_at: DateTime<Utc>,
    pub subscribed: bool,
    pub display: DisplayParams,
    /// NACM cache generation this session last built against.
    pub acm_generation: u64,
    /// Notifications waiting for the bounded drain.
    pub pending_notifs: VecDeque<String>,
    out_tx: UnboundedSender<SessionOutput>,
    pub drop_reason: Option<DropReason>,
}

impl Session {
    fn new(sid: SessionId, now: DateTime<Utc>, out_tx: UnboundedSender<SessionOutput>) -> Self {
        Self {
            sid,
            instate: Instate::Init,
            user: None,
            peer: None,
            transport: None,
            protocol: None,
            decoder: FrameDecoder::new(FramingMode::EndOfMessage),
            encoder: FrameEncoder::new(FramingMode::EndOfMessage),
            client_caps: CapabilitySet::new(),
            counters: SessionCounters::default(),
            started_at: now,
            last_rpc_at: now,
            subscribed: false,
            display: DisplayParams::default(),
            acm_generation: 0,
            pending_notifs: VecDeque::new(),
            out_tx,
            drop_reason: None,
        }
    }

    /// Queue framed bytes for the connection writer.
    pub fn send(&self, payload: &[u8]) {
        let framed = self.encoder.encode(payload);
        let _ = self.out_tx.send(SessionOutput::Msg(framed));
    }

    /// Queue raw bytes without framing (server hello before negotiation
    /// still uses EOM framing, so this is only for teardown markers).
    pub fn send_close(&self) {
        let _ = self.out_tx.send(SessionOutput::Close);
    }

    /// Switch both directions to the negotiated framing.
    pub fn set_framing(&mut self, mode: FramingMode) {
        self.decoder.set_mode(mode);
        self.encoder.set_mode(mode);
    }

    pub fn username(&self) -> &str {
        self.user.as_deref().unwrap_or("-")
    }

    pub fn touch_rpc(&mut self, now: DateTime<Utc>) {
        self.last_rpc_at = now;
    }
}

/// Bounded pool of sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Option<Session>>,
    /// Next candidate slot; zero means "scan from 1".
    next_sid: u32,
    active: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_SESSIONS);
        slots.resize_with(MAX_SESSIONS, || None);
        Self { slots, next_sid: 1, active: 0 }
    }

    /// Allocate a session slot, scanning for a free id if the dispenser
    /// wrapped. The pool cap surfaces as resource-denied.
    pub fn alloc(
        &mut self,
        now: DateTime<Utc>,
        out_tx: UnboundedSender<SessionOutput>,
    ) -> Result<SessionId, Status> {
        let slot = if self.next_sid == 0 {
            // dispenser exhausted: scan for a released slot
            (1..MAX_SESSIONS as u32).find(|i| self.slots[*i as usize].is_none())
        } else {
            Some(self.next_sid)
        };
        let Some(slot) = slot else {
            return Err(Status::ResourceDenied("session pool exhausted".to_string()));
        };
        if self.slots[slot as usize].is_some() {
            return Err(Status::ResourceDenied("session pool exhausted".to_string()));
        }

        let sid = SessionId(slot);
        self.slots[slot as usize] = Some(Session::new(sid, now, out_tx));
        self.active += 1;
        if self.next_sid != 0 {
            self.next_sid += 1;
            if self.next_sid == MAX_SESSIONS as u32 {
                self.next_sid = 0;
            }
        }
        debug!(session = %sid, "session slot allocated");
        Ok(sid)
    }

    pub fn get(&self, sid: SessionId) -> Option<&Session> {
        self.slots.get(sid.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, sid: SessionId) -> Option<&mut Session> {
        self.slots.get_mut(sid.0 as usize).and_then(|s| s.as_mut())
    }

    /// Release a slot; the id becomes reusable.
    pub fn release(&mut self, sid: SessionId) -> Option<Session> {
        let out = self.slots.get_mut(sid.0 as usize).and_then(Option::take);
        if out.is_some() {
            self.active -= 1;
        }
        out
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

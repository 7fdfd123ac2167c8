// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for session socket I/O.
//!
//! Accepts connections on the local socket (and optionally TCP for the
//! SSH front-end hand-off) and runs one reader task per connection.
//! Outbound bytes flow through the session's queue to a writer task,
//! so replies and notifications preserve per-session order; a Close
//! marker behind the queued output implements drain-then-teardown.

use std::sync::Arc;

use ncs_core::error::Status;
use ncs_core::id::SessionId;
use ncs_core::rpcerr::RpcErrorList;
use ncs_wire::framing::{FrameEncoder, FramingMode};
use ncs_wire::msg::{ReplyBody, ReplyBuilder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::{self, DispatchOutcome};
use crate::server::Server;
use crate::session::{DropReason, Instate, SessionOutput};

/// Listener over the bound sockets.
pub struct Listener {
    unix: UnixListener,
    tcp: Option<TcpListener>,
    server: Arc<Server>,
}

impl Listener {
    pub fn new(unix: UnixListener, server: Arc<Server>) -> Self {
        Self { unix, tcp: None, server }
    }

    pub fn with_tcp(unix: UnixListener, tcp: TcpListener, server: Arc<Server>) -> Self {
        Self { unix, tcp: Some(tcp), server }
    }

    /// Accept until shutdown, spawning a task per connection.
    pub async fn run(self) {
        let server = self.server;
        match self.tcp {
            None => loop {
                tokio::select! {
                    result = self.unix.accept() => match result {
                        Ok((stream, _)) => spawn_connection(stream, Arc::clone(&server)),
                        Err(e) => error!("accept error: {}", e),
                    },
                    _ = server.shutdown_notify.notified() => break,
                }
            },
            Some(tcp) => loop {
                tokio::select! {
                    result = self.unix.accept() => match result {
                        Ok((stream, _)) => spawn_connection(stream, Arc::clone(&server)),
                        Err(e) => error!("accept error: {}", e),
                    },
                    result = tcp.accept() => match result {
                        Ok((stream, addr)) => {
                            debug!("TCP connection from {}", addr);
                            spawn_connection(stream, Arc::clone(&server));
                        }
                        Err(e) => error!("TCP accept error: {}", e),
                    },
                    _ = server.shutdown_notify.notified() => break,
                }
            },
        }
        info!("listener stopped");
    }
}

fn spawn_connection<S>(stream: S, server: Arc<Server>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(stream);
        handle_connection(reader, writer, server).await;
    });
}

/// Run one connection: allocate a session slot, pump bytes through the
/// framing decoder into dispatch, and tear down on close.
async fn handle_connection<R, W>(mut reader: R, writer: W, server: Arc<Server>)
where
    R: AsyncRead + AsyncReadExt + Unpin + Send + 'static,
    W: AsyncWrite + AsyncWriteExt + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<SessionOutput>();

    let sid = match alloc_session(&server, out_tx) {
        Ok(sid) => sid,
        Err((status, reply)) => {
            // hard cap: best-effort resource-denied, then close
            let mut writer = writer;
            let _ = writer.write_all(&reply).await;
            let _ = writer.shutdown().await;
            warn!("connection refused: {status}");
            return;
        }
    };
    debug!(session = %sid, "connection open");

    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    let mut buf = [0u8; 8192];
    loop {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = server.conn_cancel.cancelled() => break,
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(session = %sid, error = %e, "read error");
                break;
            }
        };

        // feed the framing decoder and collect completed messages
        let mut messages = Vec::new();
        let framing_failed = {
            let mut state = server.state.lock();
            let Some(sess) = state.sessions.get_mut(sid) else { break };
            match sess.decoder.accept(&buf[..n]) {
                Err(e) => {
                    warn!(session = %sid, error = %e, "framing error, closing session");
                    sess.drop_reason = Some(DropReason::BadStart);
                    // best-effort malformed-message report
                    let reply = framing_error_reply(&state);
                    if let Some(sess) = state.sessions.get_mut(sid) {
                        sess.send(&reply);
                        sess.send_close();
                    }
                    true
                }
                Ok(()) => {
                    while let Some(msg) = sess.decoder.next_message() {
                        messages.push(msg.bytes());
                    }
                    false
                }
            }
        };
        if framing_failed {
            break;
        }

        let mut closing = false;
        for msg in messages {
            // one inbound message per pass, strictly in order
            if dispatch::process_message(&server, sid, msg) == DispatchOutcome::CloseSession {
                closing = true;
                break;
            }
        }
        if closing {
            break;
        }

        // a kill-session or shutdown may have marked us while queued
        let requested = {
            let state = server.state.lock();
            state
                .sessions
                .get(sid)
                .map(|s| s.instate == Instate::ShutdownReq)
                .unwrap_or(true)
        };
        if requested {
            break;
        }
    }

    // drain queued output, then release everything the session held
    {
        let mut state = server.state.lock();
        if let Some(sess) = state.sessions.get_mut(sid) {
            sess.instate = Instate::Shutdown;
            sess.send_close();
        }
        dispatch::teardown_session(&mut state, &server.profile, sid);
    }
    let _ = writer_task.await;
    debug!(session = %sid, "connection closed");
}

/// Writer side: queued buffers go out strictly in order; Close shuts
/// the stream down after everything before it is written.
async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<SessionOutput>)
where
    W: AsyncWrite + AsyncWriteExt + Unpin,
{
    while let Some(out) = rx.recv().await {
        match out {
            SessionOutput::Msg(bytes) => {
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = writer.flush().await;
            }
            SessionOutput::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}

/// Allocate a session slot, returning the resource-denied status and its
/// encoded reply together so the caller never holds the server lock
/// across an await point.
fn alloc_session(
    server: &Server,
    out_tx: mpsc::UnboundedSender<SessionOutput>,
) -> Result<SessionId, (Status, Vec<u8>)> {
    let mut state = server.state.lock();
    match state.sessions.alloc(chrono::Utc::now(), out_tx) {
        Ok(sid) => Ok(sid),
        Err(status) => {
            let reply = over_capacity_reply(&state, &status);
            Err((status, reply))
        }
    }
}

/// EOM-framed resource-denied reply for connections refused at the cap.
fn over_capacity_reply(state: &crate::server::ServerState, status: &Status) -> Vec<u8> {
    let mut errors = RpcErrorList::new();
    errors.push_status(status);
    let doc = ReplyBuilder::new(state.wk.nc, None).build(&state.ns, ReplyBody::Errors(errors));
    FrameEncoder::new(FramingMode::EndOfMessage).encode(doc.as_bytes())
}

fn framing_error_reply(state: &crate::server::ServerState) -> Vec<u8> {
    let mut errors = RpcErrorList::new();
    errors.push_status(&Status::InvalidFraming);
    ReplyBuilder::new(state.wk.nc, None)
        .build(&state.ns, ReplyBody::Errors(errors))
        .into_bytes()
}

/// Timer service: hello timeout, idle timeout and the confirmed-commit
/// deadline, all checked once per tick.
pub async fn run_timers(server: Arc<Server>) {
    let tick = crate::env::timer_tick();
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = server.shutdown_notify.notified() => break,
        }
        let now = chrono::Utc::now();
        let mut state = server.state.lock();
        crate::ops::check_confirm_expiry(&mut state, &server.profile);
        state.drain_notifications(&server.profile);

        let hello_timeout = server.profile.hello_timeout_secs;
        let idle_timeout = server.profile.idle_timeout_secs;
        if hello_timeout == 0 && idle_timeout == 0 {
            continue;
        }
        let mut drop_list: Vec<SessionId> = Vec::new();
        for sess in state.sessions.iter() {
            let age = (now - sess.last_rpc_at).num_seconds().max(0) as u64;
            match sess.instate {
                Instate::HelloWait | Instate::Init if hello_timeout > 0 => {
                    let waited = (now - sess.started_at).num_seconds().max(0) as u64;
                    if waited >= hello_timeout {
                        drop_list.push(sess.sid);
                    }
                }
                // an active subscription holds an idle session open
                Instate::Idle if idle_timeout > 0 && !sess.subscribed => {
                    if age >= idle_timeout {
                        drop_list.push(sess.sid);
                    }
                }
                _ => {}
            }
        }
        for sid in drop_list {
            info!(session = %sid, "session timed out");
            if let Some(sess) = state.sessions.get_mut(sid) {
                sess.drop_reason = Some(DropReason::Timeout);
                sess.instate = Instate::ShutdownReq;
                sess.send_close();
            }
        }
    }
}

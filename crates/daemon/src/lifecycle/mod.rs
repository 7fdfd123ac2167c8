// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server lifecycle: staged init, run loop, cooperative shutdown.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use crate::listener::{run_timers, Listener};
use crate::server::{Server, ShutdownMode};
use crate::signal::run_signals;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot resolve a state directory")]
    NoStateDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another server holds the lock file: {0}")]
    LockFailed(std::io::Error),
    #[error("cannot bind {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),
    #[error("configuration load failed: {0}")]
    ConfigLoad(#[from] ncs_store::StoreError),
    #[error("transaction-id file: {0}")]
    TxId(#[from] ncs_store::txid::TxIdError),
}

/// Everything startup produced: the context plus the bound sockets.
pub struct StartupResult {
    pub server: Arc<Server>,
    pub unix: UnixListener,
    pub tcp: Option<TcpListener>,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
}

/// Run the server until a shutdown request, then drain and tear down.
/// Returns the shutdown mode so the binary can reset or exit.
pub async fn run(started: StartupResult) -> ShutdownMode {
    let StartupResult { server, unix, tcp, lock_file, socket_path, lock_path } = started;

    let listener = match tcp {
        Some(tcp) => Listener::with_tcp(unix, tcp, Arc::clone(&server)),
        None => Listener::new(unix, Arc::clone(&server)),
    };
    let listener_task = tokio::spawn(listener.run());
    let timer_task = tokio::spawn(run_timers(Arc::clone(&server)));
    let signal_task = tokio::spawn(run_signals(Arc::clone(&server)));

    server.shutdown_notify.notified().await;
    let mode = server.shutdown_mode().unwrap_or(ShutdownMode::Exit);
    info!(?mode, "shutting down");

    // drain in-flight session I/O, bounded by the drain timeout
    let drain = crate::env::drain_timeout();
    let _ = tokio::time::timeout(drain, async {
        loop {
            let active = {
                let state = server.state.lock();
                state.sessions.active_count()
            };
            if active == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    })
    .await;

    shutdown_teardown(&server);

    listener_task.abort();
    timer_task.abort();
    signal_task.abort();

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&lock_path);
    drop(lock_file);
    mode
}

/// Reverse-order teardown of server state.
fn shutdown_teardown(server: &Server) {
    let mut state = server.state.lock();

    // a confirmed commit owned by this process rolls back first
    if let Some(pending) = state.confirm.take() {
        warn!("confirmed commit pending at shutdown, restoring running");
        state.running.restore(pending.snapshot);
    }

    // close any remaining sessions
    let sids: Vec<_> = state.sessions.iter().map(|s| s.sid).collect();
    for sid in sids {
        if let Some(sess) = state.sessions.get_mut(sid) {
            sess.send_close();
        }
        crate::dispatch::teardown_session(&mut state, &server.profile, sid);
    }

    // final snapshot of running
    let path = server.profile.startup_file();
    let reg_save = state.running.save_to_file(&path, &state.ns);
    if let Err(e) = reg_save {
        warn!(error = %e, "final snapshot save failed");
    }

    // instrumentation modules unload in reverse init order
    for (ns, name) in state.instruments.drain_reverse() {
        info!(ns = %ns, module = %name, "instrumentation module unloaded");
    }

    state.running.set_cleanup();
    if let Some(c) = state.candidate.as_mut() {
        c.set_cleanup();
    }
    if let Some(s) = state.startup.as_mut() {
        s.set_cleanup();
    }
    info!("teardown complete");
}

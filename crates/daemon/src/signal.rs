// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-driven shutdown requests.
//!
//! INT / TERM / QUIT request shutdown-exit, HUP requests
//! shutdown-reset, PIPE and ALRM are ignored (handlers installed so
//! the default termination disposition never fires).

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::server::{Server, ShutdownMode};

/// Install handlers and run until the first shutdown-class signal.
pub async fn run_signals(server: Arc<Server>) {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGINT handler: {e}");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGTERM handler: {e}");
            return;
        }
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGQUIT handler: {e}");
            return;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGHUP handler: {e}");
            return;
        }
    };
    // installed but never acted on: ignore broken pipes and alarms
    let _pipe = signal(SignalKind::pipe());
    let _alarm = signal(SignalKind::alarm());

    tokio::select! {
        _ = interrupt.recv() => {
            info!("SIGINT");
            server.request_shutdown(ShutdownMode::Exit);
        }
        _ = terminate.recv() => {
            info!("SIGTERM");
            server.request_shutdown(ShutdownMode::Exit);
        }
        _ = quit.recv() => {
            info!("SIGQUIT");
            server.request_shutdown(ShutdownMode::Exit);
        }
        _ = hangup.recv() => {
            info!("SIGHUP");
            server.request_shutdown(ShutdownMode::Reset);
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staged server startup.
//!
//! Phase 1 (CLI → profile) happens in the binary. Phase 2 builds the
//! world in dependency order: registries and handler table, datastores,
//! capabilities, access control, session table, built-in modules,
//! instrumentation, the persisted transaction id, the running load,
//! default-fill and root-check, then ready.

use std::io::Write as _;
use std::sync::Arc;

use fs2::FileExt;
use ncs_store::{check, LoadPolicy, TxIdFile};
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use super::{LifecycleError, StartupResult};
use crate::env;
use crate::profile::Profile;
use crate::server::{Server, ServerState};

/// Start the server with a phase-1 profile.
pub async fn startup(profile: Profile) -> Result<StartupResult, LifecycleError> {
    let socket_path = profile.state_dir.join("ncsd.sock");
    let lock_path = profile.state_dir.join("ncsd.pid");
    match startup_inner(profile).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // don't clean up a lock failure: those files belong to the
            // already-running server
            if !matches!(e, LifecycleError::LockFailed(_)) {
                let _ = std::fs::remove_file(&socket_path);
                let _ = std::fs::remove_file(&lock_path);
            }
            Err(e)
        }
    }
}

async fn startup_inner(profile: Profile) -> Result<StartupResult, LifecycleError> {
    // state directory and exclusive lock come first
    std::fs::create_dir_all(&profile.state_dir)?;
    let lock_path = profile.state_dir.join("ncsd.pid");
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // phase 2: registries, schema modules, datastores, capabilities,
    // access control and the session table all come up together
    let mut state = ServerState::new(&profile);

    // persisted transaction id
    let txid_file = TxIdFile::new(profile.txid_file());
    state.tx_counter = txid_file.load()?;
    info!(txid = %state.tx_counter, "transaction counter restored");
    state.txid_file = Some(txid_file);

    // load running from the startup snapshot
    let snapshot = profile.startup_file();
    if !profile.factory_startup && snapshot.exists() {
        let lookup = state.ns_lookup();
        let policy =
            if profile.startup_error_fatal { LoadPolicy::Fatal } else { LoadPolicy::Prune };
        state.running.load_from_file(&snapshot, &state.schema, lookup, policy)?;
        for err in state.running.load_errors() {
            warn!(path = %err.path, status = %err.status, "startup subtree pruned");
        }
    } else {
        info!("starting with factory (empty) running configuration");
    }

    // default-fill, prune, whole-tree root check
    let filled = state.running.default_fill(&state.schema);
    if filled > 0 {
        info!(filled, "default leaves filled");
    }
    state.running.prune_empty_containers(&state.schema);
    let problems = check::root_check(
        state.running.tree(),
        state.running.root(),
        &state.schema,
    );
    for p in &problems {
        warn!(path = %p.path, status = %p.status, "root check");
    }
    if !problems.is_empty() && profile.startup_error_fatal {
        return Err(LifecycleError::ConfigLoad(ncs_store::StoreError::LoadFatal {
            path: problems[0].path.clone(),
            status: problems[0].status.clone(),
        }));
    }

    // candidate mirrors running; a distinct startup store loads the
    // same snapshot it will be saved to
    if state.candidate.is_some() {
        let running_snapshot = state.running.snapshot();
        if let Some(candidate) = state.candidate.as_mut() {
            candidate.restore(running_snapshot);
            candidate.set_ready();
        }
    }
    if state.startup.is_some() {
        let running_snapshot = state.running.snapshot();
        if let Some(startup) = state.startup.as_mut() {
            startup.restore(running_snapshot);
            startup.set_ready();
        }
    }
    state.running.set_ready();

    // sockets bind last, after everything can serve
    let socket_path = profile.state_dir.join("ncsd.sock");
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?;
    let tcp = match env::tcp_port() {
        Some(port) => Some(
            TcpListener::bind(("127.0.0.1", port))
                .await
                .map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?,
        ),
        None => None,
    };

    let server = Server::new(profile, state);
    info!("server ready");
    Ok(StartupResult { server, unix, tcp, lock_file, socket_path, lock_path })
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server profile: everything phase-1 init decides before any module
//! loads. Filled from the CLI wrapper's options; unknown options are the
//! wrapper's problem, not ours.

use std::path::PathBuf;

/// Which datastore `<edit-config>` targets by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStore {
    Running,
    Candidate,
}

/// Startup handling: mirror keeps running==startup in one file;
/// distinct maintains a separate startup datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Mirror,
    Distinct,
}

/// Access-control enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmMode {
    Off,
    Warn,
    Permissive,
    Enforcing,
}

impl AcmMode {
    pub fn parse(s: &str) -> Option<AcmMode> {
        match s {
            "off" => Some(AcmMode::Off),
            "warn" => Some(AcmMode::Warn),
            "permissive" => Some(AcmMode::Permissive),
            "enforcing" => Some(AcmMode::Enforcing),
            _ => None,
        }
    }
}

/// Server profile with the defaults a bare invocation gets.
#[derive(Debug, Clone)]
pub struct Profile {
    pub target: TargetStore,
    pub start_mode: StartMode,
    /// Path of the running snapshot; resolved against the state dir
    /// when relative.
    pub startup_path: PathBuf,
    /// Load the factory (empty) config instead of the snapshot.
    pub factory_startup: bool,
    /// A load error in the startup file is fatal instead of pruned.
    pub startup_error_fatal: bool,
    pub log_file: Option<PathBuf>,
    pub acm_mode: AcmMode,
    pub log_acm_reads: bool,
    pub log_acm_writes: bool,
    pub superuser: Option<String>,
    /// Ports accepted in `<ncx-connect transport="ssh" port=...>`;
    /// empty means any.
    pub allowed_ssh_ports: Vec<u16>,
    /// Handshake token `<ncx-connect magic=...>` must present.
    pub magic_token: String,
    pub hello_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub eventlog_size: usize,
    /// Max notifications drained to one session per pass.
    pub max_burst: usize,
    pub with_defaults: ncs_store::WithDefaults,
    pub module_path: Vec<PathBuf>,
    pub state_dir: PathBuf,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            target: TargetStore::Candidate,
            start_mode: StartMode::Mirror,
            startup_path: PathBuf::from("startup-cfg.xml"),
            factory_startup: false,
            startup_error_fatal: false,
            log_file: None,
            acm_mode: AcmMode::Enforcing,
            log_acm_reads: false,
            log_acm_writes: true,
            superuser: None,
            allowed_ssh_ports: Vec::new(),
            magic_token: default_magic(),
            hello_timeout_secs: 300,
            idle_timeout_secs: 3600,
            eventlog_size: 1000,
            max_burst: 10,
            with_defaults: ncs_store::WithDefaults::Explicit,
            module_path: Vec::new(),
            state_dir: PathBuf::from("."),
        }
    }
}

impl Profile {
    pub fn has_candidate(&self) -> bool {
        self.target == TargetStore::Candidate
    }

    pub fn has_startup(&self) -> bool {
        self.start_mode == StartMode::Distinct
    }

    pub fn ssh_port_allowed(&self, port: u16) -> bool {
        self.allowed_ssh_ports.is_empty() || self.allowed_ssh_ports.contains(&port)
    }

    /// Absolute path of the running snapshot.
    pub fn startup_file(&self) -> PathBuf {
        if self.startup_path.is_absolute() {
            self.startup_path.clone()
        } else {
            self.state_dir.join(&self.startup_path)
        }
    }

    /// The transaction-id sidecar lives next to the snapshot.
    pub fn txid_file(&self) -> PathBuf {
        let mut path = self.startup_file();
        path.set_extension("txid");
        path
    }
}

/// The registered handshake token for local transports. Deployments
/// override it via the CLI wrapper.
fn default_magic() -> String {
    "x56o-\\8a#T!internal".to_string()
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;

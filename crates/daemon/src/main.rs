// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ncsd: the NETCONF server binary.
//!
//! Thin wrapper: parse CLI options into the server profile, set up
//! tracing, then hand off to the lifecycle controller. A HUP-driven
//! reset loops back into startup with the same profile.

use clap::Parser;
use ncs_daemon::server::ShutdownMode;
use ncs_daemon::{env, lifecycle, AcmMode, Profile, StartMode, TargetStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ncsd", about = "NETCONF protocol server", version)]
struct Args {
    /// Edit target: candidate or running
    #[arg(long, default_value = "candidate")]
    target: String,

    /// Keep a distinct startup datastore
    #[arg(long)]
    with_startup: bool,

    /// Start from the factory (empty) configuration
    #[arg(long)]
    factory_startup: bool,

    /// Treat startup configuration errors as fatal
    #[arg(long)]
    startup_error: bool,

    /// Running snapshot path (relative paths resolve in the state dir)
    #[arg(long, default_value = "startup-cfg.xml")]
    startup: PathBuf,

    /// Log file (stderr when omitted)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Access control mode: off | warn | permissive | enforcing
    #[arg(long, default_value = "enforcing")]
    access_control: String,

    /// Log denied read access
    #[arg(long)]
    log_acm_reads: bool,

    /// Superuser account name (bypasses access control)
    #[arg(long)]
    superuser: Option<String>,

    /// Allowed SSH ports for ncx-connect (repeatable; empty = any)
    #[arg(long = "port")]
    ports: Vec<u16>,

    /// Handshake token expected from transport front-ends
    #[arg(long)]
    magic: Option<String>,

    /// Seconds a session may sit in hello-wait (0 disables)
    #[arg(long, default_value_t = 300)]
    hello_timeout: u64,

    /// Seconds an idle session survives without RPCs (0 disables)
    #[arg(long, default_value_t = 3600)]
    idle_timeout: u64,

    /// Event log ring size
    #[arg(long, default_value_t = 1000)]
    eventlog_size: usize,

    /// Max notifications delivered to one session per pass
    #[arg(long, default_value_t = 10)]
    max_burst: usize,

    /// Basic with-defaults mode: report-all | trim | explicit
    #[arg(long, default_value = "explicit")]
    with_defaults: String,

    /// Module search path entries (repeatable; NCS_MODPATH adds more)
    #[arg(long = "modpath")]
    modpath: Vec<PathBuf>,
}

fn profile_from_args(args: &Args) -> Result<Profile, String> {
    let target = match args.target.as_str() {
        "candidate" => TargetStore::Candidate,
        "running" => TargetStore::Running,
        other => return Err(format!("unknown target {other:?}")),
    };
    let acm_mode = AcmMode::parse(&args.access_control)
        .ok_or_else(|| format!("unknown access-control mode {:?}", args.access_control))?;
    let with_defaults = ncs_store::WithDefaults::parse(&args.with_defaults)
        .ok_or_else(|| format!("unknown with-defaults mode {:?}", args.with_defaults))?;
    let state_dir = env::state_dir().map_err(|e| e.to_string())?;

    let mut module_path = args.modpath.clone();
    module_path.extend(env::module_path());

    let mut profile = Profile {
        target,
        start_mode: if args.with_startup { StartMode::Distinct } else { StartMode::Mirror },
        startup_path: args.startup.clone(),
        factory_startup: args.factory_startup,
        startup_error_fatal: args.startup_error,
        log_file: args.log.clone(),
        acm_mode,
        log_acm_reads: args.log_acm_reads,
        superuser: args.superuser.clone(),
        allowed_ssh_ports: args.ports.clone(),
        hello_timeout_secs: args.hello_timeout,
        idle_timeout_secs: args.idle_timeout,
        eventlog_size: args.eventlog_size,
        max_burst: args.max_burst,
        with_defaults,
        module_path,
        state_dir,
        ..Profile::default()
    };
    if let Some(magic) = &args.magic {
        profile.magic_token = magic.clone();
    }
    Ok(profile)
}

fn init_tracing(profile: &Profile) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &profile.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let profile = match profile_from_args(&args) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("ncsd: {msg}");
            return ExitCode::from(2);
        }
    };
    let _log_guard = init_tracing(&profile);

    loop {
        let started = match lifecycle::startup(profile.clone()).await {
            Ok(s) => s,
            Err(e) => {
                error!("startup failed: {e}");
                return ExitCode::from(1);
            }
        };
        match lifecycle::run(started).await {
            ShutdownMode::Exit => break,
            ShutdownMode::Reset => {
                tracing::info!("reset requested, restarting");
                continue;
            }
        }
    }
    ExitCode::SUCCESS
}

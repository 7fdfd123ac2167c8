// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Server protocol implementation version advertised in `<ncx-connect>`.
pub const SERVER_VERSION: u32 = 1;

/// Resolve state directory: NCS_STATE_DIR > XDG_STATE_HOME/ncs > ~/.local/state/ncs
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("NCS_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("ncs"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/ncs"))
}

/// Module search path: colon-separated directories scanned in order.
pub fn module_path() -> Vec<PathBuf> {
    std::env::var("NCS_MODPATH")
        .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
        .unwrap_or_default()
}

/// TCP port for framed connections handed over by the SSH front-end.
pub fn tcp_port() -> Option<u16> {
    std::env::var("NCS_TCP_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}

/// Timer service tick interval override.
pub fn timer_tick() -> Duration {
    std::env::var("NCS_TIMER_TICK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(1000))
}

/// Shutdown drain timeout (default 5s).
pub fn drain_timeout() -> Duration {
    std::env::var("NCS_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction-id sidecar file.
//!
//! A small text file living next to the running snapshot, overwritten
//! atomically on every commit so the monotonic transaction counter
//! survives restart.

use ncs_core::id::TxId;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxIdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt transaction-id file {0}")]
    Corrupt(PathBuf),
}

/// Handle on the sidecar file.
#[derive(Debug, Clone)]
pub struct TxIdFile {
    path: PathBuf,
}

impl TxIdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last committed id; a missing file starts at zero.
    pub fn load(&self) -> Result<TxId, TxIdError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let id = text
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| TxIdError::Corrupt(self.path.clone()))?;
                Ok(TxId(id))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TxId(0)),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `id` atomically: write a temp file in the same directory,
    /// then rename over the sidecar.
    pub fn store(&self, id: TxId) -> Result<(), TxIdError> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            writeln!(f, "{}", id.0)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "txid_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted bootstrap progress.
//!
//! Each stage's completion flag is written only after the stage's effect is
//! observed, via a temp file renamed into place and fsynced, so a crash at
//! any point converges on re-run.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapState {
    #[serde(default)]
    pub redeemed: bool,
    #[serde(default)]
    pub repo_cloned: bool,
    #[serde(default)]
    pub devcontainer_ready: bool,
    #[serde(default)]
    pub credential_helper_installed: bool,
    #[serde(default)]
    pub ready_reported: bool,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub callback_token: Option<String>,
}

impl BootstrapState {
    /// Load the state file; a missing file is a fresh node.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_json::from_str(&contents).context("bootstrap state file is corrupt")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).context("reading bootstrap state"),
        }
    }

    /// Atomically persist: write a temp file in the same directory, fsync,
    /// then rename over the target.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).context("replacing bootstrap state file")?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.redeemed
            && self.repo_cloned
            && self.devcontainer_ready
            && self.credential_helper_installed
            && self.ready_reported
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

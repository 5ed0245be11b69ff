// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! State directory layout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::env;

const CONFIG_NAME: &str = "config.toml";
const QUEUE_NAME: &str = "queue.jsonl";
const CHECKPOINTS_NAME: &str = "checkpoints.json";
const CACHE_NAME: &str = "cache.db";
/// Socket filename within the state directory.
const SOCKET_NAME: &str = "daemon.sock";
/// PID filename within the state directory.
const PID_NAME: &str = "daemon.pid";
/// Lock filename for single instance guarantee.
const LOCK_NAME: &str = "daemon.lock";
const LOG_NAME: &str = "daemon.log";

/// Picks the state directory: the flag, then `COURIER_STATE_DIR`, then
/// `$XDG_STATE_HOME/courier`, then `~/.local/state/courier`.
pub fn resolve_state_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    if let Some(dir) = env::state_dir() {
        return dir;
    }
    if let Some(dir) = env::xdg_state_home() {
        return dir.join("courier");
    }
    dirs::home_dir()
        .map(|h| h.join(".local/state/courier"))
        .unwrap_or_else(|| PathBuf::from(".local/state/courier"))
}

/// Files the daemon keeps under its state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: PathBuf) -> Self {
        StatePaths { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the state directory if missing.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_NAME)
    }

    pub fn queue(&self) -> PathBuf {
        self.root.join(QUEUE_NAME)
    }

    pub fn checkpoints(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_NAME)
    }

    pub fn cache(&self) -> PathBuf {
        self.root.join(CACHE_NAME)
    }

    pub fn socket(&self) -> PathBuf {
        self.root.join(SOCKET_NAME)
    }

    pub fn pid(&self) -> PathBuf {
        self.root.join(PID_NAME)
    }

    pub fn lock(&self) -> PathBuf {
        self.root.join(LOCK_NAME)
    }

    pub fn log(&self) -> PathBuf {
        self.root.join(LOG_NAME)
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

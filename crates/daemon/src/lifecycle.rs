// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance lock, PID file and cleanup.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::StatePaths;

/// Takes the exclusive lock on `lock_path`. The lock lasts as long as the
/// returned file is open.
pub fn acquire_lock(lock_path: &Path) -> Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive().map_err(|_| Error::AlreadyRunning)?;
    Ok(file)
}

pub fn write_pid_file(pid_path: &Path) -> Result<()> {
    fs::write(pid_path, std::process::id().to_string())?;
    Ok(())
}

/// PID recorded by a running daemon, if any.
pub fn read_pid(pid_path: &Path) -> Option<u32> {
    fs::read_to_string(pid_path).ok()?.trim().parse().ok()
}

/// Removes the PID file and socket. Missing files are ignored.
pub fn cleanup(paths: &StatePaths) {
    let _ = fs::remove_file(paths.pid());
    let _ = fs::remove_file(paths.socket());
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

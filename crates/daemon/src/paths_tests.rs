// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::env::names;
use crate::test_support::EnvGuard;
use yare::parameterized;

#[test]
fn flag_wins_over_environment() {
    let _guard = EnvGuard::set(names::COURIER_STATE_DIR, "/from/env");
    let dir = resolve_state_dir(Some(PathBuf::from("/from/flag")));
    assert_eq!(dir, PathBuf::from("/from/flag"));
}

#[test]
fn courier_state_dir_wins_over_xdg() {
    let _guard = EnvGuard::set(names::COURIER_STATE_DIR, "/from/env")
        .and_set(names::XDG_STATE_HOME, "/xdg");
    assert_eq!(resolve_state_dir(None), PathBuf::from("/from/env"));
}

#[test]
fn xdg_state_home_gets_courier_subdir() {
    let _guard = EnvGuard::remove(names::COURIER_STATE_DIR).and_set(names::XDG_STATE_HOME, "/xdg");
    assert_eq!(resolve_state_dir(None), PathBuf::from("/xdg/courier"));
}

#[test]
fn falls_back_to_home_local_state() {
    let _guard = EnvGuard::remove(names::COURIER_STATE_DIR).and_remove(names::XDG_STATE_HOME);
    let dir = resolve_state_dir(None);
    assert!(dir.ends_with(".local/state/courier"));
}

#[parameterized(
    config = { StatePaths::config, "config.toml" },
    queue = { StatePaths::queue, "queue.jsonl" },
    checkpoints = { StatePaths::checkpoints, "checkpoints.json" },
    cache = { StatePaths::cache, "cache.db" },
    socket = { StatePaths::socket, "daemon.sock" },
    pid = { StatePaths::pid, "daemon.pid" },
    lock = { StatePaths::lock, "daemon.lock" },
    log = { StatePaths::log, "daemon.log" },
)]
fn files_live_in_root(file: fn(&StatePaths) -> PathBuf, name: &str) {
    let paths = StatePaths::new(PathBuf::from("/state"));
    assert_eq!(file(&paths), PathBuf::from("/state").join(name));
}

#[test]
fn ensure_creates_nested_root() {
    let temp = tempfile::tempdir().unwrap();
    let paths = StatePaths::new(temp.path().join("a/b/courier"));
    paths.ensure().unwrap();
    assert!(paths.root().is_dir());
}

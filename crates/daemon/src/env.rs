// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variable access.

use std::path::PathBuf;

pub mod names {
    include!(concat!(env!("OUT_DIR"), "/env_names.rs"));
}

/// State directory override from `COURIER_STATE_DIR`.
pub fn state_dir() -> Option<PathBuf> {
    non_empty(names::COURIER_STATE_DIR)
}

pub fn xdg_state_home() -> Option<PathBuf> {
    non_empty(names::XDG_STATE_HOME)
}

fn non_empty(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! courierd - the courier delivery and sync daemon.
//!
//! Keeps the outbound queue, sync checkpoints and local cache under a state
//! directory (`~/.local/state/courier/` by default), delivers queued
//! operations and mirrors remote collections while the remote is reachable.
//! Listens on a Unix socket for IPC from user-facing clients.
//!
//! Usage:
//!   courierd [run] [--state-dir <path>] [--config <path>]
//!   courierd status|sync|send|retry|dismiss|list|ping|stop

use std::fs;
use std::path::Path;

use clap::Parser;

mod cli;
mod commands;
mod config;
mod env;
mod error;
mod lifecycle;
mod paths;
mod probe;
mod runner;
#[cfg(test)]
mod test_support;

use cli::{Cli, Command};
use error::Result;
use paths::StatePaths;

fn main() {
    let cli = Cli::parse();
    let paths = StatePaths::new(paths::resolve_state_dir(cli.state_dir));

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(&paths, cli.config.as_deref()),
        command => commands::dispatch(command, &paths, cli.output),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run_daemon(paths: &StatePaths, config_path: Option<&Path>) -> Result<()> {
    paths.ensure()?;
    setup_logging(&paths.log());

    let config = match config_path {
        Some(path) => config::load(path),
        None => config::load(&paths.config()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return Err(e);
        }
    };

    tracing::info!(
        state_dir = %paths.root().display(),
        remote = %config.remote.url,
        "courierd starting"
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(runner::run(paths, config));
    if let Err(e) = &result {
        tracing::error!(error = %e, "courierd failed");
    }
    result
}

fn setup_logging(log_path: &Path) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    if let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

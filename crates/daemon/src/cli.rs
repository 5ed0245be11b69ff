// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use courier_core::OperationKind;

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn parse_kind(s: &str) -> Result<OperationKind, String> {
    s.parse().map_err(|e: courier_core::Error| e.to_string())
}

/// Output format for client commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "courierd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first delivery and sync daemon")]
pub struct Cli {
    /// State directory (default: $COURIER_STATE_DIR, then ~/.local/state/courier)
    #[arg(long, global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/config.toml)
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Output format for client commands
    #[arg(short = 'o', long, global = true, value_enum, default_value_t)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the daemon in the foreground (default)
    Run,
    /// Show daemon status
    Status,
    /// Sync now and print the report
    Sync {
        /// Discard checkpoints and the local cache, then bootstrap
        #[arg(long)]
        reset: bool,
    },
    /// Queue an action for delivery
    Send {
        /// Conversation or other target id
        #[arg(value_parser = non_empty_string)]
        target: String,
        /// Message body or reference
        body: String,
        /// Operation kind
        #[arg(short, long, default_value = "text", value_parser = parse_kind)]
        kind: OperationKind,
    },
    /// Retry a failed or abandoned operation
    Retry { op_id: String },
    /// Drop an abandoned operation
    Dismiss { op_id: String },
    /// List queued operations
    List,
    /// Check that the daemon answers
    Ping,
    /// Ask the daemon to shut down
    Stop,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client subcommands: talk to a running daemon and print the answer.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use courier::SyncReport;
use courier_ipc::{DaemonClient, DaemonStatus, OperationInfo};

use crate::cli::{Command, OutputFormat};
use crate::error::{Error, Result};
use crate::paths::StatePaths;

/// Syncs may take a while on a slow link.
const SYNC_TIMEOUT: Duration = Duration::from_secs(120);

fn connect(paths: &StatePaths) -> Result<DaemonClient> {
    let socket = paths.socket();
    if !socket.exists() {
        return Err(Error::NotRunning(socket));
    }
    Ok(DaemonClient::connect(&socket)?)
}

fn print<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text(value)),
    }
    Ok(())
}

/// Runs a client subcommand. `Command::Run` is handled by the caller.
pub fn dispatch(command: Command, paths: &StatePaths, format: OutputFormat) -> Result<()> {
    match command {
        Command::Run => Ok(()),
        Command::Status => {
            let status = connect(paths)?.status()?;
            print(format, &status, format_status)
        }
        Command::Sync { reset } => {
            let socket = paths.socket();
            if !socket.exists() {
                return Err(Error::NotRunning(socket));
            }
            let report = DaemonClient::connect_with_timeout(&socket, SYNC_TIMEOUT)?.sync_now(reset)?;
            print(format, &report, format_report)
        }
        Command::Send { target, body, kind } => {
            let op_id = connect(paths)?.send(&target, kind, &body)?;
            print(format, &serde_json::json!({ "op_id": op_id }), |_| {
                format!("queued {}\n", op_id)
            })
        }
        Command::Retry { op_id } => {
            let op = connect(paths)?.retry(&op_id)?;
            print(format, &op, |op| format!("{} is {} again\n", op.id, op.state))
        }
        Command::Dismiss { op_id } => {
            connect(paths)?.dismiss(&op_id)?;
            print(format, &serde_json::json!({ "dismissed": op_id }), |_| {
                format!("dismissed {}\n", op_id)
            })
        }
        Command::List => {
            let ops = connect(paths)?.list_operations()?;
            print(format, &ops, |ops| format_operations(ops))
        }
        Command::Ping => {
            connect(paths)?.ping()?;
            print(format, &serde_json::json!({ "alive": true }), |_| "pong\n".to_string())
        }
        Command::Stop => {
            connect(paths)?.shutdown()?;
            print(format, &serde_json::json!({ "stopping": true }), |_| {
                "daemon stopping\n".to_string()
            })
        }
    }
}

pub fn format_status(status: &DaemonStatus) -> String {
    let service = &status.service;
    let mut out = String::new();
    let _ = writeln!(out, "pid:          {}", status.pid);
    let _ = writeln!(out, "uptime:       {}s", status.uptime_secs);
    let _ = writeln!(out, "remote:       {}", status.remote_url);
    let _ = writeln!(out, "connectivity: {}", service.connectivity);
    let _ = writeln!(out, "pending:      {}", service.pending_operations);
    if service.abandoned_operations > 0 {
        let _ = writeln!(out, "abandoned:    {}", service.abandoned_operations);
    }
    let sync_state = if service.engine.running { "running" } else { "idle" };
    let _ = writeln!(out, "sync:         {}", sync_state);
    if !service.engine.outstanding.is_empty() {
        let names: Vec<_> = service.engine.outstanding.iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "outstanding:  {}", names.join(", "));
    }
    if let Some(report) = &service.engine.last_report {
        let _ = writeln!(out, "last sync:    {} at {}", report.mode, report.finished_at.to_rfc3339());
    }
    let _ = write!(out, "background:   {}", service.scheduler.state);
    if let Some(next) = service.scheduler.next_run_in {
        let _ = write!(out, " (next in {}s)", next.as_secs());
    }
    out.push('\n');
    out
}

pub fn format_report(report: &SyncReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} sync: {} applied, {} collection(s) ok",
        report.mode,
        report.entities_applied,
        report.succeeded.len()
    );
    for failure in &report.failed {
        let _ = writeln!(out, "  failed {}: {}", failure.collection, failure.message);
    }
    if !report.cancelled.is_empty() {
        let names: Vec<_> = report.cancelled.iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "  cancelled: {}", names.join(", "));
    }
    if report.overwritten_local > 0 {
        let _ = writeln!(out, "  {} local edit(s) replaced by remote", report.overwritten_local);
    }
    if let Some(drain) = &report.drain {
        let _ = writeln!(
            out,
            "  delivered {}, retrying {}, abandoned {}",
            drain.delivered, drain.retried, drain.abandoned
        );
    }
    out
}

pub fn format_operations(ops: &[OperationInfo]) -> String {
    if ops.is_empty() {
        return "no queued operations\n".to_string();
    }
    let mut out = String::new();
    for op in ops {
        let _ = write!(
            out,
            "{}  {:<10} {:<9} {} (attempts: {})",
            op.id,
            op.state.as_str(),
            op.kind.as_str(),
            op.target_id,
            op.attempt_count
        );
        if let Some(err) = &op.last_error {
            let _ = write!(out, "  {}", err);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

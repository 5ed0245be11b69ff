// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background scheduler for periodic incremental syncs.
//!
//! ```text
//! idle --arm--> scheduled --execute--> running --done--> scheduled
//! ```
//!
//! The host facility calls [`BackgroundScheduler::execute`] with a deadline
//! and an expiry token. The next run is armed as soon as a run starts, and
//! the run's cancellation token fires `cancel_margin` before the deadline
//! or when the host expires the run.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::engine::{SyncEngine, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Running,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Scheduled => "scheduled",
            SchedulerState::Running => "running",
        };
        f.write_str(s)
    }
}

/// Result of asking the scheduler to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// Refused: the minimum interval since the last start has not elapsed.
    TooSoon { retry_after: Duration },
    /// Refused: a scheduled or foreground run is already executing.
    Busy,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Time until the next run is due, if armed.
    pub next_run_in: Option<Duration>,
    pub runs: u64,
    /// Runs that stopped early with collections left outstanding.
    pub cancelled_runs: u64,
}

struct Inner {
    state: SchedulerState,
    last_started: Option<Instant>,
    next_due: Option<Instant>,
    runs: u64,
    cancelled_runs: u64,
}

pub struct BackgroundScheduler {
    config: SchedulerConfig,
    engine: SyncEngine,
    inner: Mutex<Inner>,
}

impl BackgroundScheduler {
    pub fn new(config: SchedulerConfig, engine: SyncEngine) -> Self {
        BackgroundScheduler {
            config,
            engine,
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                last_started: None,
                next_due: None,
                runs: 0,
                cancelled_runs: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves idle to scheduled with the first run due immediately.
    pub fn arm(&self) {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Idle {
            inner.state = SchedulerState::Scheduled;
            inner.next_due = Some(Instant::now());
            tracing::debug!("background sync armed");
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.lock();
        let now = Instant::now();
        SchedulerStatus {
            state: inner.state,
            next_run_in: inner.next_due.map(|due| due.saturating_duration_since(now)),
            runs: inner.runs,
            cancelled_runs: inner.cancelled_runs,
        }
    }

    /// Runs one incremental sync within the budget ending at `deadline`.
    ///
    /// Cancellation is cooperative: the engine stops at the next collection
    /// boundary and whatever completed keeps its checkpoint. A foreground
    /// run already in flight makes this call return [`RunOutcome::Busy`]
    /// rather than wait on a run the deadline cannot cancel.
    pub async fn execute(&self, deadline: Instant, expiry: CancellationToken) -> RunOutcome {
        let now = Instant::now();
        let cancel = CancellationToken::new();
        let run = {
            let mut inner = self.lock();
            if inner.state == SchedulerState::Running {
                return RunOutcome::Busy;
            }
            if let Some(last) = inner.last_started {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.config.min_interval() {
                    return RunOutcome::TooSoon {
                        retry_after: self.config.min_interval() - elapsed,
                    };
                }
            }
            let Some(run) = self.engine.try_incremental_sync(cancel.clone()) else {
                tracing::debug!("sync already in flight; background run skipped");
                return RunOutcome::Busy;
            };
            inner.state = SchedulerState::Running;
            inner.last_started = Some(now);
            inner.next_due = Some(now + self.config.min_interval());
            inner.runs += 1;
            run
        };

        let cancel_at = deadline
            .checked_sub(self.config.cancel_margin())
            .unwrap_or(now)
            .max(now);
        tracing::info!(budget_ms = deadline.saturating_duration_since(now).as_millis() as u64, "background sync started");

        tokio::pin!(run);
        let report = tokio::select! {
            report = &mut run => report,
            _ = tokio::time::sleep_until(cancel_at) => {
                tracing::info!("background sync deadline near, cancelling");
                cancel.cancel();
                run.await
            }
            _ = expiry.cancelled() => {
                tracing::info!("background sync expired by host, cancelling");
                cancel.cancel();
                run.await
            }
        };

        {
            let mut inner = self.lock();
            inner.state = SchedulerState::Scheduled;
            if !report.cancelled.is_empty() {
                inner.cancelled_runs += 1;
            }
        }
        RunOutcome::Completed(report)
    }

    /// Host loop: waits for each slot and executes with a `max_run` budget
    /// until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.arm();
        loop {
            let due = self.lock().next_due.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(due) => {}
            }

            let deadline = Instant::now() + self.config.max_run();
            match self.execute(deadline, shutdown.child_token()).await {
                RunOutcome::Completed(report) => {
                    tracing::debug!(succeeded = report.succeeded.len(), cancelled = report.cancelled.len(), "background sync finished");
                }
                RunOutcome::TooSoon { retry_after } => {
                    let mut inner = self.lock();
                    inner.next_due = Some(Instant::now() + retry_after);
                }
                RunOutcome::Busy => {
                    let mut inner = self.lock();
                    inner.next_due = Some(Instant::now() + self.config.min_interval());
                }
            }
        }
        tracing::debug!("background scheduler stopped");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

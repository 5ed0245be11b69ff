// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of the local cache with the remote store.
//!
//! A run walks the collections in priority order, fully applying one before
//! fetching the next. Failures stay per collection: the others still run,
//! only successful collections advance their checkpoint, and failed or
//! cancelled ones are remembered as outstanding so the next run retries
//! only them.
//!
//! At most one run exists at a time. A request made while a run is in
//! flight attaches to it and receives the same [`SyncReport`]; a caller
//! that must keep its own cancellation uses
//! [`SyncEngine::try_incremental_sync`] instead.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use courier_core::{
    Checkpoint, ClockSource, Collection, Error, ErrorKind, LocalCache, Result,
};

use crate::checkpoint_store::CheckpointStore;
use crate::config::EngineConfig;
use crate::events::{CoreEvent, EventBus};
use crate::queue::{DrainReport, OutboundQueue};
use crate::remote::RemoteStore;

/// What a run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Recent window per collection; establishes checkpoints.
    Bootstrap,
    /// Changes since each checkpoint.
    Incremental,
    /// Checkpoints and cache cleared, then bootstrapped.
    Reset,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Bootstrap => "bootstrap",
            SyncMode::Incremental => "incremental",
            SyncMode::Reset => "reset",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collection that could not be synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFailure {
    pub collection: Collection,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: Vec<Collection>,
    pub failed: Vec<CollectionFailure>,
    /// Collections skipped because the run was cancelled.
    pub cancelled: Vec<Collection>,
    pub entities_applied: usize,
    /// Unsent local edits replaced by the remote value.
    pub overwritten_local: usize,
    /// Unsent local edits in the cache when the run started.
    #[serde(default)]
    pub pending_local: usize,
    /// Queue drain triggered by a fully successful incremental run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainReport>,
}

impl SyncReport {
    fn new(mode: SyncMode, started_at: DateTime<Utc>) -> Self {
        SyncReport {
            mode,
            started_at,
            finished_at: started_at,
            succeeded: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            entities_applied: 0,
            overwritten_local: 0,
            pending_local: 0,
            drain: None,
        }
    }

    /// Every attempted collection succeeded and nothing was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    fn fail_all(mut self, collections: &[Collection], err: &Error) -> Self {
        self.failed = collections
            .iter()
            .map(|&collection| CollectionFailure {
                collection,
                kind: err.kind(),
                message: err.to_string(),
            })
            .collect();
        self
    }
}

/// Snapshot of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub runs_started: u64,
    pub last_report: Option<SyncReport>,
    pub outstanding: Vec<Collection>,
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunRequest {
    Bootstrap,
    Incremental,
    /// Bootstrap if needed, else incremental.
    Auto,
    Reset,
}

type SharedRun = Shared<BoxFuture<'static, SyncReport>>;

#[derive(Default)]
struct CollectionStats {
    applied: usize,
    overwritten: usize,
}

/// Collaborators of a [`SyncEngine`].
pub struct EngineDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub cache: Arc<dyn LocalCache>,
    pub checkpoints: CheckpointStore,
    pub queue: Arc<OutboundQueue>,
    pub clock: Arc<dyn ClockSource>,
    pub events: EventBus,
}

struct EngineInner {
    config: EngineConfig,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    checkpoints: CheckpointStore,
    queue: Arc<OutboundQueue>,
    clock: Arc<dyn ClockSource>,
    events: EventBus,
    current: Mutex<Option<SharedRun>>,
    last_report: Mutex<Option<SyncReport>>,
    runs_started: AtomicU64,
}

/// The sync engine. Cheap to clone; clones share the same run slot.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        for err in deps.checkpoints.recovered() {
            deps.events.emit(CoreEvent::CorruptedState {
                source: "checkpoints".to_string(),
                message: err.to_string(),
            });
        }
        SyncEngine {
            inner: Arc::new(EngineInner {
                config,
                remote: deps.remote,
                cache: deps.cache,
                checkpoints: deps.checkpoints,
                queue: deps.queue,
                clock: deps.clock,
                events: deps.events,
                current: Mutex::new(None),
                last_report: Mutex::new(None),
                runs_started: AtomicU64::new(0),
            }),
        }
    }

    /// Fetches the recent window of every collection and sets checkpoints.
    pub async fn bootstrap_sync(&self, cancel: CancellationToken) -> SyncReport {
        self.start_or_attach(RunRequest::Bootstrap, cancel).await
    }

    /// Fetches changes since each checkpoint; drains the queue on success.
    ///
    /// `cancel` is honored between collections. When attaching to a run
    /// that is already in flight, the token of the original caller governs.
    pub async fn incremental_sync(&self, cancel: CancellationToken) -> SyncReport {
        self.start_or_attach(RunRequest::Incremental, cancel).await
    }

    /// Starts an incremental run governed by `cancel`, or returns `None`
    /// if a run is already in flight.
    pub fn try_incremental_sync(
        &self,
        cancel: CancellationToken,
    ) -> Option<impl Future<Output = SyncReport> + Send + 'static> {
        self.try_start(RunRequest::Incremental, cancel).ok()
    }

    /// Bootstraps if the cache is fresh, otherwise syncs incrementally.
    pub async fn sync_now(&self, cancel: CancellationToken) -> SyncReport {
        self.start_or_attach(RunRequest::Auto, cancel).await
    }

    /// Clears checkpoints and the cache, then bootstraps.
    ///
    /// Waits for any in-flight run instead of attaching to it.
    pub async fn full_reset(&self, cancel: CancellationToken) -> SyncReport {
        loop {
            match self.try_start(RunRequest::Reset, cancel.clone()) {
                Ok(run) => return run.await,
                Err(existing) => {
                    existing.await;
                }
            }
        }
    }

    /// Returns true if no checkpoint exists yet or the cache holds nothing,
    /// as after the cache file was lost or recreated.
    pub fn needs_bootstrap(&self) -> bool {
        self.inner.needs_bootstrap()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_current().is_some()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.is_running(),
            runs_started: self.inner.runs_started.load(Ordering::Relaxed),
            last_report: self.inner.lock_last_report().clone(),
            outstanding: self.inner.checkpoints.outstanding(),
            checkpoints: self.inner.checkpoints.all(),
        }
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.inner.queue
    }

    fn start_or_attach(&self, request: RunRequest, cancel: CancellationToken) -> SharedRun {
        self.try_start(request, cancel).unwrap_or_else(|existing| {
            tracing::debug!("attaching to in-flight sync run");
            existing
        })
    }

    /// Starts a run unless one is in flight, in which case that run is
    /// returned as the error.
    fn try_start(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<SharedRun, SharedRun> {
        let mut slot = self.inner.lock_current();
        if let Some(existing) = slot.as_ref() {
            return Err(existing.clone());
        }

        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let report = inner.execute(request, cancel).await;
            inner.finish(&report);
            report
        });

        let inner = Arc::clone(&self.inner);
        let started_at = inner.clock.now();
        let run = async move {
            match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "sync run aborted");
                    *inner.lock_current() = None;
                    let err = Error::CorruptedState(format!("sync run aborted: {e}"));
                    SyncReport::new(SyncMode::Incremental, started_at)
                        .fail_all(&Collection::PRIORITY, &err)
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(run.clone());
        Ok(run)
    }
}

impl EngineInner {
    fn lock_current(&self) -> MutexGuard<'_, Option<SharedRun>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_last_report(&self) -> MutexGuard<'_, Option<SyncReport>> {
        self.last_report.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn needs_bootstrap(&self) -> bool {
        if self.checkpoints.is_empty() {
            return true;
        }
        match self.cache.is_empty() {
            Ok(empty) => empty,
            Err(err) => {
                tracing::warn!(error = %err, "cannot inspect cache; bootstrapping");
                true
            }
        }
    }

    fn finish(&self, report: &SyncReport) {
        *self.lock_last_report() = Some(report.clone());
        *self.lock_current() = None;
        self.events.emit(CoreEvent::SyncCompleted {
            report: report.clone(),
        });
    }

    async fn execute(&self, request: RunRequest, cancel: CancellationToken) -> SyncReport {
        let started_at = self.clock.now();
        let mode = match request {
            RunRequest::Bootstrap => SyncMode::Bootstrap,
            RunRequest::Incremental => SyncMode::Incremental,
            RunRequest::Auto if self.needs_bootstrap() => SyncMode::Bootstrap,
            RunRequest::Auto => SyncMode::Incremental,
            RunRequest::Reset => {
                if let Err(err) = self.reset_state() {
                    tracing::error!(error = %err, "full reset failed");
                    return SyncReport::new(SyncMode::Reset, started_at)
                        .fail_all(&Collection::PRIORITY, &err);
                }
                SyncMode::Reset
            }
        };

        let outstanding = self.checkpoints.outstanding();
        let collections = if mode == SyncMode::Incremental && !outstanding.is_empty() {
            outstanding
        } else {
            Collection::PRIORITY.to_vec()
        };

        tracing::info!(mode = %mode, collections = ?collections, "sync run started");
        let mut report = SyncReport::new(mode, started_at);
        match self.cache.read_pending() {
            Ok(pending) if !pending.is_empty() => {
                tracing::info!(count = pending.len(), "unsent local edits may be overwritten by remote");
                report.pending_local = pending.len();
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "cannot read pending local edits"),
        }

        for (index, &collection) in collections.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled.extend_from_slice(&collections[index..]);
                tracing::info!(remaining = ?report.cancelled, "sync run cancelled");
                break;
            }

            match self.sync_collection(collection, mode).await {
                Ok(stats) => {
                    report.succeeded.push(collection);
                    report.entities_applied += stats.applied;
                    report.overwritten_local += stats.overwritten;
                }
                Err(err) => {
                    tracing::warn!(collection = %collection, kind = %err.kind(), error = %err, "collection sync failed");
                    if err.is_user_visible() {
                        self.events.emit(CoreEvent::PermanentError {
                            collection,
                            message: err.to_string(),
                        });
                    }
                    report.failed.push(CollectionFailure {
                        collection,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let still_outstanding: Vec<Collection> = report
            .failed
            .iter()
            .map(|f| f.collection)
            .chain(report.cancelled.iter().copied())
            .collect();
        if let Err(err) = self.checkpoints.set_outstanding(&still_outstanding) {
            tracing::error!(error = %err, "failed to persist outstanding collections");
        }

        // The drain shares the run's budget
        if mode == SyncMode::Incremental && report.is_success() && !cancel.is_cancelled() {
            report.drain = Some(self.queue.drain_until(&cancel).await);
        }

        report.finished_at = self.clock.now();
        tracing::info!(
            mode = %mode,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            applied = report.entities_applied,
            "sync run finished"
        );
        report
    }

    fn reset_state(&self) -> Result<()> {
        self.checkpoints.reset()?;
        self.cache.clear()?;
        tracing::info!("checkpoints and cache cleared");
        Ok(())
    }

    async fn sync_collection(&self, collection: Collection, mode: SyncMode) -> Result<CollectionStats> {
        let mut stats = CollectionStats::default();
        let existing = match mode {
            SyncMode::Incremental => self.checkpoints.get(collection),
            SyncMode::Bootstrap | SyncMode::Reset => None,
        };

        let checkpoint = match existing {
            None => {
                let page = self
                    .remote
                    .fetch_snapshot(collection, self.config.bootstrap_window)
                    .await?;
                self.apply(collection, &page.entities, &mut stats)?;
                Checkpoint::new(collection, page.cursor, self.clock.now())
            }
            Some(mut checkpoint) => loop {
                let page = self
                    .remote
                    .fetch_since(collection, checkpoint.clone())
                    .await?;
                self.apply(collection, &page.entities, &mut stats)?;
                let advanced = checkpoint.advanced(page.cursor, self.clock.now());
                // A page that does not move the cursor ends the collection
                let stalled = advanced.cursor == checkpoint.cursor;
                checkpoint = advanced;
                if !page.has_more || stalled {
                    break checkpoint;
                }
            },
        };

        self.checkpoints.advance(checkpoint)?;
        tracing::debug!(collection = %collection, applied = stats.applied, "collection synced");
        Ok(stats)
    }

    fn apply(
        &self,
        collection: Collection,
        entities: &[courier_core::Entity],
        stats: &mut CollectionStats,
    ) -> Result<()> {
        let outcome = self.cache.apply(collection, entities)?;
        stats.applied += outcome.upserted + outcome.deleted;
        if !outcome.overwritten_local.is_empty() {
            tracing::warn!(
                collection = %collection,
                count = outcome.overwritten_local.len(),
                ids = ?outcome.overwritten_local,
                "remote overwrote unsent local edits"
            );
            stats.overwritten += outcome.overwritten_local.len();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Application root: owns the components and the internal work queue.
//!
//! Nothing here is global. [`SyncService::new`] builds every component from
//! explicit collaborators and [`SyncService::run`] drives them until the
//! shutdown token fires.
//!
//! Background work (drains and syncs requested by connectivity changes,
//! retry timers and startup) goes through a bounded mpsc queue. A request
//! for work that is already queued is coalesced into the existing one.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use courier_core::{
    ClockSource, ConnectivityState, LocalCache, NewOperation, OperationId, OperationState,
    QueuedOperation, Result,
};

use crate::checkpoint_store::CheckpointStore;
use crate::config::CourierConfig;
use crate::connectivity::{ConnectivityMonitor, RawSignal};
use crate::engine::{EngineDeps, EngineStatus, SyncEngine, SyncReport};
use crate::events::{CoreEvent, EventBus};
use crate::queue::OutboundQueue;
use crate::remote::RemoteStore;
use crate::scheduler::{BackgroundScheduler, SchedulerStatus};

const WORK_QUEUE_CAPACITY: usize = 16;
const MIN_RETRY_WAIT: Duration = Duration::from_millis(250);

/// Background work the service performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItem {
    Drain,
    IncrementalSync,
    SyncNow,
}

/// External collaborators and durable state locations.
pub struct ServiceDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub cache: Arc<dyn LocalCache>,
    pub clock: Arc<dyn ClockSource>,
    pub queue_path: PathBuf,
    pub checkpoint_path: PathBuf,
}

/// Combined status of all components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub connectivity: ConnectivityState,
    pub pending_operations: usize,
    pub abandoned_operations: usize,
    pub engine: EngineStatus,
    pub scheduler: SchedulerStatus,
}

pub struct SyncService {
    monitor: ConnectivityMonitor,
    queue: Arc<OutboundQueue>,
    engine: SyncEngine,
    scheduler: BackgroundScheduler,
    events: EventBus,
    clock: Arc<dyn ClockSource>,
    work_tx: mpsc::Sender<WorkItem>,
    work_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    queued: Mutex<HashSet<WorkItem>>,
}

impl SyncService {
    /// Builds the service. Must be called from within a tokio runtime.
    pub fn new(config: &CourierConfig, deps: ServiceDeps) -> Result<Self> {
        let events = EventBus::new();
        let queue = Arc::new(OutboundQueue::open(
            &deps.queue_path,
            config.queue.clone(),
            Arc::clone(&deps.remote),
            Arc::clone(&deps.clock),
            events.clone(),
        )?);
        let checkpoints = CheckpointStore::open(&deps.checkpoint_path)?;
        let engine = SyncEngine::new(
            config.sync.clone(),
            EngineDeps {
                remote: deps.remote,
                cache: deps.cache,
                checkpoints,
                queue: Arc::clone(&queue),
                clock: Arc::clone(&deps.clock),
                events: events.clone(),
            },
        );
        let scheduler = BackgroundScheduler::new(config.scheduler.clone(), engine.clone());
        let monitor = ConnectivityMonitor::new(&config.connectivity);
        let (work_tx, work_rx) = mpsc::channel(WORK_QUEUE_CAPACITY);

        Ok(SyncService {
            monitor,
            queue,
            engine,
            scheduler,
            events,
            clock: deps.clock,
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            queued: Mutex::new(HashSet::new()),
        })
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.scheduler
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Platform connectivity callback.
    pub fn report_connectivity(&self, signal: RawSignal) {
        self.monitor.report(signal);
    }

    /// Queues a user action and, if online, asks for a drain.
    pub fn send(&self, op: NewOperation) -> Result<OperationId> {
        let id = self.queue.enqueue(op)?;
        if self.monitor.current_state().is_reachable() {
            self.request(WorkItem::Drain);
        }
        Ok(id)
    }

    pub fn retry(&self, id: &str) -> Result<QueuedOperation> {
        let op = self.queue.retry(id)?;
        self.request(WorkItem::Drain);
        Ok(op)
    }

    pub fn dismiss(&self, id: &str) -> Result<()> {
        self.queue.dismiss(id)
    }

    pub fn list_operations(&self) -> Vec<QueuedOperation> {
        self.queue.list()
    }

    /// Syncs immediately and waits for the report.
    pub async fn sync_now(&self) -> SyncReport {
        self.engine.sync_now(CancellationToken::new()).await
    }

    pub async fn full_reset(&self) -> SyncReport {
        self.engine.full_reset(CancellationToken::new()).await
    }

    pub fn status(&self) -> ServiceStatus {
        let ops = self.queue.list();
        ServiceStatus {
            connectivity: self.monitor.current_state(),
            pending_operations: ops.iter().filter(|o| o.state.is_outstanding()).count(),
            abandoned_operations: ops
                .iter()
                .filter(|o| o.state == OperationState::Abandoned)
                .count(),
            engine: self.engine.status(),
            scheduler: self.scheduler.status(),
        }
    }

    fn lock_queued(&self) -> MutexGuard<'_, HashSet<WorkItem>> {
        self.queued.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Asks the work loop to perform `item`. Returns false if the same item
    /// is already waiting.
    pub fn request(&self, item: WorkItem) -> bool {
        let mut queued = self.lock_queued();
        if !queued.insert(item) {
            tracing::trace!(?item, "work already queued");
            return false;
        }
        if self.work_tx.try_send(item).is_err() {
            queued.remove(&item);
            tracing::warn!(?item, "work queue full; request dropped");
            return false;
        }
        true
    }

    /// Runs the work loop, the connectivity watcher and the background
    /// scheduler until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let rx = self
            .work_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(rx) = rx else {
            tracing::warn!("sync service is already running");
            return;
        };

        // Replayed operations and the first sync of the session
        self.request(WorkItem::Drain);
        self.request(WorkItem::SyncNow);

        tokio::join!(
            self.work_loop(rx, shutdown.clone()),
            self.watch_connectivity(shutdown.clone()),
            self.scheduler.run(shutdown.clone()),
        );
        tracing::info!("sync service stopped");
    }

    async fn work_loop(&self, mut rx: mpsc::Receiver<WorkItem>, shutdown: CancellationToken) {
        loop {
            let retry_in = self.next_retry_in();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => {
                        self.lock_queued().remove(&item);
                        self.handle(item, &shutdown).await;
                    }
                    None => break,
                },
                _ = tokio::time::sleep(retry_in.unwrap_or_default()), if retry_in.is_some() => {
                    self.handle(WorkItem::Drain, &shutdown).await;
                }
            }
        }
    }

    /// Time until the earliest backing-off operation becomes eligible.
    /// None while offline; reconnecting requests a drain instead.
    fn next_retry_in(&self) -> Option<Duration> {
        if !self.monitor.current_state().is_reachable() {
            return None;
        }
        let next = self.queue.next_eligible_at()?;
        let wait = (next - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        Some(wait.max(MIN_RETRY_WAIT))
    }

    async fn handle(&self, item: WorkItem, shutdown: &CancellationToken) {
        if !self.monitor.current_state().is_reachable() {
            tracing::debug!(?item, "offline; skipping");
            return;
        }
        tracing::debug!(?item, "handling work item");
        match item {
            WorkItem::Drain => {
                self.queue.drain_until(shutdown).await;
            }
            WorkItem::IncrementalSync => {
                self.engine.incremental_sync(shutdown.child_token()).await;
            }
            WorkItem::SyncNow => {
                self.engine.sync_now(shutdown.child_token()).await;
            }
        }
    }

    async fn watch_connectivity(&self, shutdown: CancellationToken) {
        let mut sub = self.monitor.subscribe();
        let Some(mut previous) = sub.next().await else {
            return;
        };

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = sub.next() => next,
            };
            let Some(state) = next else {
                break;
            };

            self.events.emit(CoreEvent::ConnectivityChanged { state });
            if state.is_reachable() && !previous.is_reachable() {
                tracing::info!(state = %state, "link restored");
                self.request(WorkItem::Drain);
                self.request(WorkItem::IncrementalSync);
            }
            previous = state;
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

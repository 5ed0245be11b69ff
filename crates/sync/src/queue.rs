// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable outbound queue.
//!
//! Every user action goes through [`OutboundQueue::enqueue`], which only
//! writes the journal. [`OutboundQueue::drain`] delivers eligible operations:
//! one at a time per target, in `created_at` order, with distinct targets
//! running concurrently up to `drain_parallelism`.
//!
//! State lives in memory behind a mutex that is never held across an await;
//! every mutation is journaled before the call that made it returns.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use courier_core::id::generate_unique_id;
use courier_core::{
    ClockSource, Error, ErrorKind, NewOperation, OperationId, OperationState, QueuedOperation,
    Result,
};

use crate::backoff::retry_delay;
use crate::config::QueueConfig;
use crate::events::{CoreEvent, EventBus};
use crate::journal::{Journal, JournalRecord};
use crate::remote::{RemoteError, RemoteStore};

/// Summary of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Operations acknowledged by the remote.
    pub delivered: usize,
    /// Transient failures scheduled for another attempt.
    pub retried: usize,
    /// Operations that became abandoned during this drain.
    pub abandoned: usize,
    /// Targets whose head operation was still backing off.
    pub deferred: usize,
    /// Outstanding operations left after the drain.
    pub remaining: usize,
}

impl DrainReport {
    fn merge(&mut self, other: DrainReport) {
        self.delivered += other.delivered;
        self.retried += other.retried;
        self.abandoned += other.abandoned;
        self.deferred += other.deferred;
    }
}

struct QueueState {
    /// Live operations in enqueue order.
    ops: Vec<QueuedOperation>,
    journal: Journal,
}

/// Durable, FIFO-per-target store of operations awaiting delivery.
pub struct OutboundQueue {
    config: QueueConfig,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn ClockSource>,
    events: EventBus,
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
    nonce: AtomicU64,
}

impl OutboundQueue {
    /// Opens the queue, replaying the journal at `path`.
    ///
    /// Undecodable journal lines are reported as corrupted state and
    /// skipped; the journal is then compacted so they do not come back.
    pub fn open(
        path: &Path,
        config: QueueConfig,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn ClockSource>,
        events: EventBus,
    ) -> Result<Self> {
        let (mut journal, replay) = Journal::open(path)?;

        if !replay.corrupt.is_empty() {
            for line in &replay.corrupt {
                let err = Error::CorruptedState(format!(
                    "{} line {}: {}",
                    path.display(),
                    line.line,
                    line.error
                ));
                tracing::warn!(error = %err, "skipping corrupt journal record");
                events.emit(CoreEvent::CorruptedState {
                    source: "queue".to_string(),
                    message: err.to_string(),
                });
            }
            journal.compact(&replay.ops)?;
        }
        if replay.recovered_in_flight > 0 {
            tracing::info!(
                count = replay.recovered_in_flight,
                "in-flight operations returned to pending"
            );
        }
        tracing::debug!(ops = replay.ops.len(), "outbound queue opened");

        Ok(OutboundQueue {
            config,
            remote,
            clock,
            events,
            state: Mutex::new(QueueState {
                ops: replay.ops,
                journal,
            }),
            drain_lock: tokio::sync::Mutex::new(()),
            nonce: AtomicU64::new(fastrand::u64(..)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accepts an operation for delivery.
    ///
    /// Validates and journals the operation; never touches the network.
    pub fn enqueue(&self, new_op: NewOperation) -> Result<OperationId> {
        if new_op.target_id.trim().is_empty() {
            return Err(Error::Validation("target id cannot be empty".to_string()));
        }
        if new_op.payload.len() > self.config.max_payload_bytes {
            return Err(Error::PayloadTooLarge {
                size: new_op.payload.len(),
                max: self.config.max_payload_bytes,
            });
        }

        let mut state = self.lock();

        // created_at is non-decreasing so enqueue order and created_at order agree
        let mut created_at = self.clock.now();
        if let Some(last) = state.ops.last() {
            created_at = created_at.max(last.created_at);
        }

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let ids: HashSet<&str> = state.ops.iter().map(|o| o.id.as_str()).collect();
        let id = generate_unique_id(&new_op.target_id, &created_at, nonce, |candidate| {
            ids.contains(candidate)
        });

        let op = QueuedOperation::new(id.clone(), new_op, created_at);
        state.journal.append(&JournalRecord::Put { op: op.clone() })?;
        let target_id = op.target_id.clone();
        state.ops.push(op);
        self.maybe_compact(&mut state);
        drop(state);

        tracing::debug!(op_id = %id, target = %target_id, "operation enqueued");
        self.events.emit(CoreEvent::OperationEnqueued {
            op_id: id.clone(),
            target_id,
        });
        Ok(id)
    }

    /// Removes an acknowledged operation. Unknown ids are a no-op.
    pub fn ack(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::remove_locked(&mut state, id)?;
        self.maybe_compact(&mut state);
        Ok(())
    }

    /// Makes a failed or abandoned operation pending again with a fresh
    /// attempt budget.
    pub fn retry(&self, id: &str) -> Result<QueuedOperation> {
        let now = self.clock.now();
        let mut state = self.lock();
        let op = Self::find_locked(&state, id)?;
        match op.state {
            OperationState::InFlight => {
                return Err(Error::Validation(format!(
                    "operation {id} is in flight and cannot be retried"
                )));
            }
            OperationState::Pending => return Ok(op.clone()),
            OperationState::Failed | OperationState::Abandoned => {}
        }

        let mut updated = op.clone();
        updated.state = OperationState::Pending;
        updated.attempt_count = 0;
        updated.next_eligible_at = now;
        updated.last_error = None;
        Self::put_locked(&mut state, updated.clone())?;
        tracing::info!(op_id = %id, "operation retried by user");
        Ok(updated)
    }

    /// Removes an abandoned operation the user has acknowledged.
    pub fn dismiss(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        let op = Self::find_locked(&state, id)?;
        if op.state != OperationState::Abandoned {
            return Err(Error::Validation(format!(
                "operation {id} is {}; only abandoned operations can be dismissed",
                op.state
            )));
        }
        Self::remove_locked(&mut state, id)?;
        self.maybe_compact(&mut state);
        tracing::info!(op_id = %id, "abandoned operation dismissed");
        Ok(())
    }

    /// Number of operations not yet delivered or abandoned.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|o| o.state.is_outstanding())
            .count()
    }

    pub fn status(&self, id: &str) -> Option<QueuedOperation> {
        self.lock().ops.iter().find(|o| o.id == id).cloned()
    }

    /// All operations in enqueue order, abandoned ones included.
    pub fn list(&self) -> Vec<QueuedOperation> {
        self.lock().ops.clone()
    }

    /// Delivers every eligible operation.
    ///
    /// Never fails: per-operation outcomes are published on the event bus
    /// and summarized in the report. Concurrent drains run one after another.
    pub async fn drain(&self) -> DrainReport {
        self.drain_until(&CancellationToken::new()).await
    }

    /// Like [`drain`](Self::drain), but stops taking new operations once
    /// `cancel` fires. Sends already in flight finish first.
    pub async fn drain_until(&self, cancel: &CancellationToken) -> DrainReport {
        let _guard = self.drain_lock.lock().await;

        let targets = {
            let mut state = self.lock();
            // Only a cancelled drain leaves operations in flight
            let stuck: Vec<QueuedOperation> = state
                .ops
                .iter()
                .filter(|o| o.state == OperationState::InFlight)
                .cloned()
                .collect();
            for mut op in stuck {
                op.state = OperationState::Pending;
                if let Err(e) = Self::put_locked(&mut state, op) {
                    tracing::error!(error = %e, "failed to journal operation state");
                }
            }

            let mut seen = HashSet::new();
            state
                .ops
                .iter()
                .filter(|o| o.state.is_outstanding())
                .filter(|o| seen.insert(o.target_id.clone()))
                .map(|o| o.target_id.clone())
                .collect::<Vec<_>>()
        };

        let parallelism = self.config.drain_parallelism.max(1);
        let mut report = stream::iter(targets)
            .map(|target| self.drain_target(target, cancel))
            .buffer_unordered(parallelism)
            .fold(DrainReport::default(), |mut acc, r| async move {
                acc.merge(r);
                acc
            })
            .await;

        report.remaining = self.pending_count();
        tracing::debug!(
            delivered = report.delivered,
            retried = report.retried,
            abandoned = report.abandoned,
            remaining = report.remaining,
            "drain finished"
        );
        report
    }

    async fn drain_target(&self, target: String, cancel: &CancellationToken) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let now = self.clock.now();
            let op = {
                let mut state = self.lock();
                let head = state
                    .ops
                    .iter()
                    .find(|o| o.target_id == target && o.state.is_outstanding())
                    .cloned();
                let Some(mut op) = head else {
                    break;
                };
                if !op.is_eligible(now) {
                    report.deferred += 1;
                    break;
                }
                op.state = OperationState::InFlight;
                if let Err(e) = Self::put_locked(&mut state, op.clone()) {
                    tracing::error!(op_id = %op.id, error = %e, "failed to journal operation state");
                    break;
                }
                op
            };

            tracing::debug!(op_id = %op.id, target = %target, attempt = op.attempt_count + 1, "sending operation");
            match self.remote.send(op.clone()).await {
                Ok(_) => {
                    if let Err(e) = self.ack(&op.id) {
                        tracing::error!(op_id = %op.id, error = %e, "failed to journal acknowledgment");
                        break;
                    }
                    report.delivered += 1;
                    self.events.emit(CoreEvent::OperationDelivered {
                        op_id: op.id,
                        target_id: op.target_id,
                    });
                }
                Err(RemoteError::Transient(msg)) => {
                    match self.record_transient_failure(&op.id, &msg) {
                        Some(OperationState::Abandoned) => report.abandoned += 1,
                        Some(_) => report.retried += 1,
                        None => {}
                    }
                    // Keep FIFO: later operations wait behind this one
                    break;
                }
                Err(RemoteError::Permanent(msg)) => {
                    if self.abandon(&op.id, ErrorKind::PermanentRemote, &msg) {
                        report.abandoned += 1;
                    }
                }
            }
        }

        report
    }

    /// Applies a transient failure. Returns the new state, or `None` if the
    /// operation is gone (acknowledged concurrently).
    fn record_transient_failure(&self, id: &str, message: &str) -> Option<OperationState> {
        let now = self.clock.now();
        let mut state = self.lock();
        let mut op = state.ops.iter().find(|o| o.id == id)?.clone();

        op.attempt_count = op.attempt_count.saturating_add(1);
        op.last_error = Some(message.to_string());
        if op.attempt_count >= self.config.max_attempts {
            drop(state);
            return self
                .abandon(id, ErrorKind::TransientNetwork, message)
                .then_some(OperationState::Abandoned);
        }

        let delay = retry_delay(&self.config, op.attempt_count);
        op.state = OperationState::Failed;
        let wait = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        op.next_eligible_at = now
            .checked_add_signed(wait)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let attempt = op.attempt_count;
        let next_eligible_at = op.next_eligible_at;
        if let Err(e) = Self::put_locked(&mut state, op) {
            tracing::error!(op_id = %id, error = %e, "failed to journal operation state");
        }
        drop(state);

        tracing::debug!(op_id = %id, attempt, delay_ms = delay.as_millis() as u64, error = %message, "transient failure, will retry");
        self.events.emit(CoreEvent::OperationRetrying {
            op_id: id.to_string(),
            attempt,
            next_eligible_at,
        });
        Some(OperationState::Failed)
    }

    /// Marks an operation abandoned and reports it. Returns false if the
    /// operation no longer exists.
    fn abandon(&self, id: &str, kind: ErrorKind, reason: &str) -> bool {
        let mut state = self.lock();
        let Some(existing) = state.ops.iter().find(|o| o.id == id) else {
            return false;
        };
        let mut op = existing.clone();
        if kind == ErrorKind::TransientNetwork {
            op.attempt_count = op.attempt_count.max(self.config.max_attempts);
        } else {
            op.attempt_count = op.attempt_count.saturating_add(1);
        }
        op.state = OperationState::Abandoned;
        op.last_error = Some(reason.to_string());
        let target_id = op.target_id.clone();
        let attempts = op.attempt_count;
        if let Err(e) = Self::put_locked(&mut state, op) {
            tracing::error!(op_id = %id, error = %e, "failed to journal operation state");
        }
        drop(state);

        tracing::warn!(op_id = %id, target = %target_id, attempt = attempts, kind = %kind, reason, "operation abandoned");
        self.events.emit(CoreEvent::OperationAbandoned {
            op_id: id.to_string(),
            target_id,
            kind,
            reason: reason.to_string(),
        });
        true
    }

    fn find_locked<'a>(state: &'a QueueState, id: &str) -> Result<&'a QueuedOperation> {
        state
            .ops
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    /// Journals then applies a replacement of an existing operation.
    fn put_locked(state: &mut QueueState, op: QueuedOperation) -> Result<()> {
        state.journal.append(&JournalRecord::Put { op: op.clone() })?;
        if let Some(existing) = state.ops.iter_mut().find(|o| o.id == op.id) {
            *existing = op;
        }
        Ok(())
    }

    fn remove_locked(state: &mut QueueState, id: &str) -> Result<()> {
        if !state.ops.iter().any(|o| o.id == id) {
            return Ok(());
        }
        state.journal.append(&JournalRecord::Remove { id: id.to_string() })?;
        state.ops.retain(|o| o.id != id);
        Ok(())
    }

    fn maybe_compact(&self, state: &mut QueueState) {
        if !state.journal.needs_compaction(self.config.compact_threshold) {
            return;
        }
        let QueueState { ops, journal } = state;
        match journal.compact(ops) {
            Ok(()) => tracing::debug!(ops = ops.len(), "journal compacted"),
            Err(e) => tracing::warn!(error = %e, "journal compaction failed"),
        }
    }

    /// Earliest time a backing-off operation becomes eligible.
    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .ops
            .iter()
            .filter(|o| o.state == OperationState::Failed)
            .map(|o| o.next_eligible_at)
            .min()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_helpers::{at, MockRemote};
use courier_core::{ManualClock, OperationKind};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::broadcast;
use yare::parameterized;

struct Harness {
    _temp: TempDir,
    path: PathBuf,
    config: QueueConfig,
    remote: Arc<MockRemote>,
    clock: Arc<ManualClock>,
    events: EventBus,
    queue: OutboundQueue,
}

impl Harness {
    fn new(config: QueueConfig) -> Self {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.jsonl");
        let remote = Arc::new(MockRemote::new());
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let events = EventBus::new();
        let queue = OutboundQueue::open(
            &path,
            config.clone(),
            remote.clone(),
            clock.clone(),
            events.clone(),
        )
        .unwrap();
        Harness {
            _temp: temp,
            path,
            config,
            remote,
            clock,
            events,
            queue,
        }
    }

    fn reopen(&self) -> OutboundQueue {
        OutboundQueue::open(
            &self.path,
            self.config.clone(),
            self.remote.clone(),
            self.clock.clone(),
            self.events.clone(),
        )
        .unwrap()
    }

    fn send(&self, target: &str, body: &str) -> OperationId {
        self.queue.enqueue(NewOperation::text(target, body)).unwrap()
    }

    fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

fn no_jitter() -> QueueConfig {
    QueueConfig {
        jitter: false,
        ..QueueConfig::default()
    }
}

fn drain_events(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn abandoned_count(events: &[CoreEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CoreEvent::OperationAbandoned { .. }))
        .count()
}

#[parameterized(
    empty = { "" },
    blank = { "   " },
)]
fn enqueue_rejects_empty_target(target: &str) {
    let h = Harness::new(no_jitter());
    let err = h.queue.enqueue(NewOperation::text(target, "hi")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.queue.pending_count(), 0);
}

#[test]
fn enqueue_rejects_oversized_payload() {
    let h = Harness::new(QueueConfig {
        max_payload_bytes: 4,
        ..no_jitter()
    });
    let err = h
        .queue
        .enqueue(NewOperation::new("conv", OperationKind::ImageRef, vec![0u8; 5]))
        .unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { size: 5, max: 4 }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn enqueue_is_durable_and_offline() {
    let h = Harness::new(no_jitter());
    let id = h.send("conv-x", "hello");

    assert!(h.remote.attempts().is_empty());
    let reopened = h.reopen();
    let op = reopened.status(&id).unwrap();
    assert_eq!(op.state, OperationState::Pending);
    assert_eq!(op.payload, b"hello".to_vec());
    assert_eq!(op.attempt_count, 0);
}

#[test]
fn ids_are_unique() {
    let h = Harness::new(no_jitter());
    let ids: HashSet<_> = (0..50).map(|i| h.send("conv", &i.to_string())).collect();
    assert_eq!(ids.len(), 50);
}

#[tokio::test]
async fn queued_ops_are_delivered_in_order() {
    let h = Harness::new(no_jitter());
    let a = h.send("X", "1");
    let b = h.send("X", "2");
    let c = h.send("X", "3");

    let report = h.queue.drain().await;

    assert_eq!(report.delivered, 3);
    assert_eq!(report.remaining, 0);
    assert_eq!(h.remote.delivered(), vec![a, b, c]);
    assert_eq!(h.queue.pending_count(), 0);
}

#[tokio::test]
async fn ops_queued_while_offline_flush_in_order_on_reconnect() {
    let h = Harness::new(no_jitter());
    h.remote.set_offline(true);
    let ids = vec![h.send("X", "1"), h.send("X", "2"), h.send("X", "3")];

    let report = h.queue.drain().await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.retried, 1);
    // FIFO: only the head was tried
    assert_eq!(h.remote.attempts().len(), 1);

    h.remote.set_offline(false);
    h.advance_secs(60);
    let report = h.queue.drain().await;

    assert_eq!(report.delivered, 3);
    assert_eq!(h.remote.delivered(), ids);
    assert_eq!(h.queue.pending_count(), 0);
}

#[tokio::test]
async fn order_is_kept_per_target_across_targets() {
    let h = Harness::new(QueueConfig {
        drain_parallelism: 3,
        ..no_jitter()
    });
    let mut expected: HashMap<&str, Vec<OperationId>> = HashMap::new();
    for i in 0..5 {
        for target in ["A", "B", "C"] {
            let id = h.send(target, &format!("{target}{i}"));
            expected.entry(target).or_default().push(id);
        }
    }

    h.queue.drain().await;

    let attempts = h.remote.attempts();
    for (target, ids) in expected {
        let delivered: Vec<_> = attempts
            .iter()
            .filter(|op| op.target_id == target)
            .map(|op| op.id.clone())
            .collect();
        assert_eq!(delivered, ids, "target {target}");
    }
}

#[tokio::test]
async fn backing_off_head_blocks_only_its_target() {
    let h = Harness::new(no_jitter());
    h.remote
        .fail_target("A", RemoteError::Transient("timeout".into()));
    let a1 = h.send("A", "1");
    h.send("A", "2");
    let b1 = h.send("B", "1");

    let report = h.queue.drain().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(h.remote.delivered(), vec![b1]);

    h.remote.clear_failures();
    // Still inside the backoff window
    let report = h.queue.drain().await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.deferred, 1);
    assert_eq!(h.queue.status(&a1).unwrap().state, OperationState::Failed);
}

#[tokio::test]
async fn transient_failure_schedules_backoff() {
    let h = Harness::new(no_jitter());
    h.remote.script_send(Err(RemoteError::Transient("503".into())));
    let id = h.send("X", "1");

    h.queue.drain().await;

    let op = h.queue.status(&id).unwrap();
    assert_eq!(op.state, OperationState::Failed);
    assert_eq!(op.attempt_count, 1);
    assert_eq!(op.next_eligible_at, at(1_002));
    assert_eq!(op.last_error.as_deref(), Some("503"));
    assert_eq!(h.queue.next_eligible_at(), Some(at(1_002)));

    h.advance_secs(2);
    let report = h.queue.drain().await;
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn exhausted_retries_abandon_exactly_once() {
    let h = Harness::new(no_jitter());
    let mut rx = h.events.subscribe();
    h.remote.set_offline(true);
    let id = h.send("X", "1");

    for _ in 0..h.config.max_attempts {
        h.queue.drain().await;
        let op = h.queue.status(&id).unwrap();
        if op.state != OperationState::Abandoned {
            assert!(op.attempt_count <= h.config.max_attempts);
        }
        h.advance_secs(3_600);
    }
    // Further drains do not touch an abandoned op
    h.queue.drain().await;

    let events = drain_events(&mut rx);
    assert_eq!(abandoned_count(&events), 1);
    let op = h.queue.status(&id).unwrap();
    assert_eq!(op.state, OperationState::Abandoned);
    assert_eq!(op.attempt_count, 5);
    assert_eq!(h.queue.pending_count(), 0);
    assert_eq!(h.remote.attempts().len(), 5);
}

#[tokio::test]
async fn permanent_error_abandons_and_target_continues() {
    let h = Harness::new(no_jitter());
    let mut rx = h.events.subscribe();
    h.remote
        .script_send(Err(RemoteError::Permanent("blocked".into())));
    let rejected = h.send("X", "1");
    let next = h.send("X", "2");

    let report = h.queue.drain().await;

    assert_eq!(report.abandoned, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.remote.delivered(), vec![next]);
    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        CoreEvent::OperationAbandoned { op_id, kind: ErrorKind::PermanentRemote, .. } if *op_id == rejected
    )));
    assert!(events.iter().any(CoreEvent::is_user_visible));
}

#[test]
fn ack_is_idempotent() {
    let h = Harness::new(no_jitter());
    let id = h.send("X", "1");

    h.queue.ack(&id).unwrap();
    h.queue.ack(&id).unwrap();
    h.queue.ack("op-unknown").unwrap();

    assert!(h.queue.status(&id).is_none());
    assert!(h.reopen().list().is_empty());
}

#[tokio::test]
async fn retry_revives_abandoned_operation() {
    let h = Harness::new(no_jitter());
    h.remote
        .script_send(Err(RemoteError::Permanent("nope".into())));
    let id = h.send("X", "1");
    h.queue.drain().await;
    assert_eq!(h.queue.status(&id).unwrap().state, OperationState::Abandoned);

    let op = h.queue.retry(&id).unwrap();
    assert_eq!(op.state, OperationState::Pending);
    assert_eq!(op.attempt_count, 0);
    assert!(op.last_error.is_none());

    let report = h.queue.drain().await;
    assert_eq!(report.delivered, 1);
}

#[test]
fn retry_unknown_operation_fails() {
    let h = Harness::new(no_jitter());
    assert!(matches!(
        h.queue.retry("op-missing"),
        Err(Error::OperationNotFound(_))
    ));
}

#[tokio::test]
async fn dismiss_only_removes_abandoned() {
    let h = Harness::new(no_jitter());
    let pending = h.send("X", "1");
    assert!(matches!(
        h.queue.dismiss(&pending),
        Err(Error::Validation(_))
    ));

    h.remote
        .fail_target("Y", RemoteError::Permanent("gone".into()));
    let doomed = h.send("Y", "1");
    h.queue.drain().await;

    h.queue.dismiss(&doomed).unwrap();
    assert!(h.queue.status(&doomed).is_none());
    assert!(h.reopen().status(&doomed).is_none());
}

#[tokio::test]
async fn in_flight_operation_is_resent_after_crash() {
    let h = Harness::new(no_jitter());
    let mut op = QueuedOperation::new(
        "op-crashed".to_string(),
        NewOperation::text("X", "1"),
        at(900),
    );
    op.state = OperationState::InFlight;
    op.attempt_count = 1;
    courier_core::jsonl::append(&h.path, &JournalRecord::Put { op }).unwrap();

    let queue = h.reopen();
    let recovered = queue.status("op-crashed").unwrap();
    assert_eq!(recovered.state, OperationState::Pending);
    assert_eq!(recovered.attempt_count, 1);

    queue.drain().await;
    assert_eq!(h.remote.delivered(), vec!["op-crashed".to_string()]);
}

#[tokio::test]
async fn reopen_yields_identical_state() {
    let h = Harness::new(no_jitter());
    h.remote
        .fail_target("A", RemoteError::Transient("flaky".into()));
    h.remote
        .fail_target("B", RemoteError::Permanent("denied".into()));
    h.send("A", "1");
    h.send("B", "1");
    h.send("C", "1");
    h.send("C", "2");
    h.queue.drain().await;
    h.send("D", "1");

    assert_eq!(h.reopen().list(), h.queue.list());
}

#[tokio::test]
async fn corrupt_journal_line_is_skipped_and_reported() {
    let h = Harness::new(no_jitter());
    let kept = h.send("X", "1");
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&h.path)
            .unwrap();
        writeln!(file, "not json").unwrap();
    }

    let mut rx = h.events.subscribe();
    let queue = h.reopen();

    assert_eq!(queue.list().len(), 1);
    assert!(queue.status(&kept).is_some());
    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::CorruptedState { source, .. } if source == "queue")));
    // Compacted on open: the bad line is gone
    let content = std::fs::read_to_string(&h.path).unwrap();
    assert!(!content.contains("not json"));
}

#[tokio::test]
async fn journal_is_compacted_past_threshold() {
    let h = Harness::new(QueueConfig {
        compact_threshold: 8,
        ..no_jitter()
    });
    for i in 0..20 {
        h.send("X", &i.to_string());
        h.queue.drain().await;
    }
    let last = h.send("X", "last");

    let lines = std::fs::read_to_string(&h.path).unwrap().lines().count();
    assert!(lines <= 9, "journal has {lines} lines");
    assert_eq!(h.reopen().list().len(), 1);
    assert!(h.reopen().status(&last).is_some());
}

#[tokio::test]
async fn concurrent_drains_deliver_each_op_once() {
    let h = Harness::new(no_jitter());
    for i in 0..10 {
        h.send(&format!("T{}", i % 3), &i.to_string());
    }

    let (first, second) = tokio::join!(h.queue.drain(), h.queue.drain());

    assert_eq!(first.delivered + second.delivered, 10);
    assert_eq!(h.remote.attempts().len(), 10);
}

#[tokio::test]
async fn delivered_event_is_published() {
    let h = Harness::new(no_jitter());
    let mut rx = h.events.subscribe();
    let id = h.send("X", "1");

    h.queue.drain().await;

    let events = drain_events(&mut rx);
    assert!(matches!(&events[0], CoreEvent::OperationEnqueued { op_id, .. } if *op_id == id));
    assert!(matches!(&events[1], CoreEvent::OperationDelivered { op_id, .. } if *op_id == id));
    assert!(!events.iter().any(CoreEvent::is_user_visible));
}

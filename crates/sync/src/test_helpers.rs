// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for the sync core.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use tempfile::TempDir;

use courier_core::{
    ApplyOutcome, Checkpoint, Collection, Entity, Error, LocalCache, ManualClock, OperationId,
    QueuedOperation, Result,
};

use crate::checkpoint_store::CheckpointStore;
use crate::config::{EngineConfig, QueueConfig};
use crate::engine::{EngineDeps, SyncEngine};
use crate::events::EventBus;
use crate::queue::OutboundQueue;
use crate::remote::{Ack, FetchPage, RemoteError, RemoteStore};

/// A fetch the engine made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    Since { collection: Collection, cursor: String },
    Snapshot { collection: Collection, limit: usize },
}

impl FetchCall {
    pub fn collection(&self) -> Collection {
        match self {
            FetchCall::Since { collection, .. } | FetchCall::Snapshot { collection, .. } => {
                *collection
            }
        }
    }
}

/// Scriptable in-memory remote store.
///
/// Unscripted sends succeed and unscripted fetches return an empty page
/// with a fresh cursor.
#[derive(Default)]
pub struct MockRemote {
    offline: AtomicBool,
    attempts: Mutex<Vec<QueuedOperation>>,
    delivered: Mutex<Vec<OperationId>>,
    send_script: Mutex<VecDeque<std::result::Result<(), RemoteError>>>,
    failing_targets: Mutex<HashMap<String, RemoteError>>,
    pages: Mutex<HashMap<Collection, VecDeque<std::result::Result<FetchPage, RemoteError>>>>,
    failing_collections: Mutex<HashMap<Collection, RemoteError>>,
    fetches: Mutex<Vec<FetchCall>>,
    fetch_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
    cursor_seq: AtomicU64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request fails transiently while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Result of the next send, consumed in order.
    pub fn script_send(&self, result: std::result::Result<(), RemoteError>) {
        self.send_script.lock().unwrap().push_back(result);
    }

    /// Every send to `target` fails with `err` until cleared.
    pub fn fail_target(&self, target: &str, err: RemoteError) {
        self.failing_targets
            .lock()
            .unwrap()
            .insert(target.to_string(), err);
    }

    /// Next page for `collection`, consumed in order.
    pub fn script_page(
        &self,
        collection: Collection,
        page: std::result::Result<FetchPage, RemoteError>,
    ) {
        self.pages
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push_back(page);
    }

    /// Every fetch of `collection` fails with `err` until cleared.
    pub fn fail_collection(&self, collection: Collection, err: RemoteError) {
        self.failing_collections
            .lock()
            .unwrap()
            .insert(collection, err);
    }

    pub fn clear_failures(&self) {
        self.failing_targets.lock().unwrap().clear();
        self.failing_collections.lock().unwrap().clear();
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Every send sleeps this long before answering.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    /// Every send attempt, successful or not.
    pub fn attempts(&self) -> Vec<QueuedOperation> {
        self.attempts.lock().unwrap().clone()
    }

    /// Ids of acknowledged operations, in delivery order.
    pub fn delivered(&self) -> Vec<OperationId> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().unwrap().clone()
    }

    fn fetch(&self, call: FetchCall) -> BoxFuture<'_, std::result::Result<FetchPage, RemoteError>> {
        async move {
            let delay = *self.fetch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let collection = call.collection();
            self.fetches.lock().unwrap().push(call);

            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Transient("offline".to_string()));
            }
            if let Some(err) = self.failing_collections.lock().unwrap().get(&collection) {
                return Err(err.clone());
            }
            let scripted = self
                .pages
                .lock()
                .unwrap()
                .get_mut(&collection)
                .and_then(|q| q.pop_front());
            scripted.unwrap_or_else(|| {
                let n = self.cursor_seq.fetch_add(1, Ordering::SeqCst);
                Ok(FetchPage {
                    entities: Vec::new(),
                    cursor: format!("{collection}-{n}"),
                    has_more: false,
                })
            })
        }
        .boxed()
    }
}

impl RemoteStore for MockRemote {
    fn send(&self, op: QueuedOperation) -> BoxFuture<'_, std::result::Result<Ack, RemoteError>> {
        async move {
            let delay = *self.send_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.attempts.lock().unwrap().push(op.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Transient("offline".to_string()));
            }
            if let Some(err) = self.failing_targets.lock().unwrap().get(&op.target_id) {
                return Err(err.clone());
            }
            let scripted = self.send_script.lock().unwrap().pop_front();
            if let Some(Err(err)) = scripted {
                return Err(err);
            }
            self.delivered.lock().unwrap().push(op.id.clone());
            Ok(Ack { op_id: op.id })
        }
        .boxed()
    }

    fn fetch_since(
        &self,
        collection: Collection,
        checkpoint: Checkpoint,
    ) -> BoxFuture<'_, std::result::Result<FetchPage, RemoteError>> {
        self.fetch(FetchCall::Since {
            collection,
            cursor: checkpoint.cursor,
        })
    }

    fn fetch_snapshot(
        &self,
        collection: Collection,
        limit: usize,
    ) -> BoxFuture<'_, std::result::Result<FetchPage, RemoteError>> {
        self.fetch(FetchCall::Snapshot { collection, limit })
    }
}

/// In-memory cache that records what was applied.
#[derive(Default)]
pub struct MockCache {
    entities: Mutex<HashMap<(Collection, String), Entity>>,
    dirty: Mutex<HashSet<String>>,
    applied: Mutex<Vec<Collection>>,
    failing: Mutex<HashSet<Collection>>,
    failing_reads: AtomicBool,
    clears: AtomicUsize,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the user edited `id` locally.
    pub fn mark_dirty(&self, id: &str) {
        self.dirty.lock().unwrap().insert(id.to_string());
    }

    /// `is_empty` and `read_pending` fail from now on.
    pub fn fail_reads(&self) {
        self.failing_reads.store(true, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<()> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Error::CorruptedState("cache unreadable".to_string()));
        }
        Ok(())
    }

    pub fn fail_apply(&self, collection: Collection) {
        self.failing.lock().unwrap().insert(collection);
    }

    /// Collections passed to `apply`, in call order.
    pub fn applied(&self) -> Vec<Collection> {
        self.applied.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl LocalCache for MockCache {
    fn apply(&self, collection: Collection, entities: &[Entity]) -> Result<ApplyOutcome> {
        if self.failing.lock().unwrap().contains(&collection) {
            return Err(Error::CorruptedState(format!("cannot write {collection}")));
        }
        self.applied.lock().unwrap().push(collection);

        let mut outcome = ApplyOutcome::default();
        let mut store = self.entities.lock().unwrap();
        let mut dirty = self.dirty.lock().unwrap();
        for entity in entities {
            if dirty.remove(&entity.id) {
                outcome.overwritten_local.push(entity.id.clone());
            }
            let key = (collection, entity.id.clone());
            if entity.deleted {
                if store.remove(&key).is_some() {
                    outcome.deleted += 1;
                }
            } else {
                store.insert(key, entity.clone());
                outcome.upserted += 1;
            }
        }
        Ok(outcome)
    }

    /// Dirty ids are reported as message edits.
    fn read_pending(&self) -> Result<Vec<Entity>> {
        self.check_reads()?;
        let mut ids: Vec<String> = self.dirty.lock().unwrap().iter().cloned().collect();
        ids.sort();
        Ok(ids
            .iter()
            .map(|id| entity(Collection::Messages, id, 0))
            .collect())
    }

    fn is_empty(&self) -> Result<bool> {
        self.check_reads()?;
        Ok(self.entities.lock().unwrap().is_empty())
    }

    fn clear(&self) -> Result<()> {
        self.entities.lock().unwrap().clear();
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn entity(collection: Collection, id: &str, secs: i64) -> Entity {
    Entity::new(collection, id, at(secs), serde_json::json!({ "id": id }))
}

/// A page holding `entities` that ends at `cursor`.
pub fn page(entities: Vec<Entity>, cursor: &str, has_more: bool) -> FetchPage {
    FetchPage {
        entities,
        cursor: cursor.to_string(),
        has_more,
    }
}

/// Queue, mocks and state directory wired together, as the service does.
pub struct TestEnv {
    pub temp: TempDir,
    pub remote: Arc<MockRemote>,
    pub cache: Arc<MockCache>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
    pub queue: Arc<OutboundQueue>,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let remote = Arc::new(MockRemote::new());
        let cache = Arc::new(MockCache::new());
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let events = EventBus::new();
        let queue = Arc::new(
            OutboundQueue::open(
                &temp.path().join("queue.jsonl"),
                QueueConfig::default(),
                remote.clone(),
                clock.clone(),
                events.clone(),
            )
            .unwrap(),
        );
        TestEnv {
            temp,
            remote,
            cache,
            clock,
            events,
            queue,
        }
    }

    /// A new engine over this environment's files, as after a restart.
    pub fn engine(&self) -> SyncEngine {
        let checkpoints =
            CheckpointStore::open(&self.temp.path().join("checkpoints.json")).unwrap();
        SyncEngine::new(
            EngineConfig::default(),
            EngineDeps {
                remote: self.remote.clone(),
                cache: self.cache.clone(),
                checkpoints,
                queue: self.queue.clone(),
                clock: self.clock.clone(),
                events: self.events.clone(),
            },
        )
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the daemon.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use courier::{Ack, FetchPage, RemoteError, RemoteStore};
use chrono::Utc;
use courier_core::{Checkpoint, Collection, Entity, QueuedOperation};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// Serializes tests that touch process environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard that sets/removes env vars and restores them on drop.
pub struct EnvGuard {
    saved: HashMap<&'static str, Option<String>>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn lock() -> Self {
        EnvGuard {
            saved: HashMap::new(),
            _lock: ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    pub fn set(key: &'static str, value: &str) -> Self {
        Self::lock().and_set(key, value)
    }

    pub fn remove(key: &'static str) -> Self {
        Self::lock().and_remove(key)
    }

    pub fn and_set(mut self, key: &'static str, value: &str) -> Self {
        self.saved.entry(key).or_insert_with(|| std::env::var(key).ok());
        std::env::set_var(key, value);
        self
    }

    pub fn and_remove(mut self, key: &'static str) -> Self {
        self.saved.entry(key).or_insert_with(|| std::env::var(key).ok());
        std::env::remove_var(key);
        self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in &self.saved {
            match original {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Remote that acknowledges every send, seeds each snapshot with one entity
/// and has no further changes.
#[derive(Default)]
pub struct AckingRemote {
    sent: Mutex<Vec<QueuedOperation>>,
}

impl AckingRemote {
    pub fn sent(&self) -> Vec<QueuedOperation> {
        self.sent.lock().unwrap().clone()
    }
}

fn empty_page(collection: Collection) -> FetchPage {
    FetchPage {
        entities: Vec::new(),
        cursor: format!("{}-0", collection),
        has_more: false,
    }
}

fn seeded_page(collection: Collection) -> FetchPage {
    let seed = Entity::new(
        collection,
        format!("{collection}-seed"),
        Utc::now(),
        serde_json::json!({}),
    );
    FetchPage {
        entities: vec![seed],
        ..empty_page(collection)
    }
}

impl RemoteStore for AckingRemote {
    fn send(&self, op: QueuedOperation) -> BoxFuture<'_, Result<Ack, RemoteError>> {
        async move {
            let op_id = op.id.clone();
            self.sent.lock().unwrap().push(op);
            Ok(Ack { op_id })
        }
        .boxed()
    }

    fn fetch_since(
        &self,
        collection: Collection,
        _checkpoint: Checkpoint,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>> {
        async move { Ok(empty_page(collection)) }.boxed()
    }

    fn fetch_snapshot(
        &self,
        collection: Collection,
        _limit: usize,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>> {
        async move { Ok(seeded_page(collection)) }.boxed()
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_helpers::at;
use tempfile::TempDir;

fn store_in(temp: &TempDir) -> CheckpointStore {
    CheckpointStore::open(&temp.path().join("checkpoints.json")).unwrap()
}

#[test]
fn missing_file_is_empty_store() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    assert!(store.is_empty());
    assert!(store.outstanding().is_empty());
    assert!(store.recovered().is_empty());
}

#[test]
fn reopen_yields_identical_state() {
    let temp = TempDir::new().unwrap();
    {
        let store = store_in(&temp);
        store
            .advance(Checkpoint::new(Collection::Messages, "m-5", at(50)))
            .unwrap();
        store
            .advance(Checkpoint::new(Collection::Conversations, "c-2", at(40)))
            .unwrap();
        store
            .set_outstanding(&[Collection::Receipts, Collection::Messages])
            .unwrap();
    }

    let store = store_in(&temp);
    let all = store.all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].collection, Collection::Conversations);
    assert_eq!(store.get(Collection::Messages).unwrap().cursor, "m-5");
    assert_eq!(
        store.outstanding(),
        vec![Collection::Messages, Collection::Receipts]
    );
}

#[test]
fn last_synced_at_never_decreases() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store
        .advance(Checkpoint::new(Collection::Messages, "a", at(100)))
        .unwrap();
    store
        .advance(Checkpoint::new(Collection::Messages, "b", at(90)))
        .unwrap();

    let cp = store.get(Collection::Messages).unwrap();
    assert_eq!(cp.cursor, "b");
    assert_eq!(cp.last_synced_at, at(100));
}

#[test]
fn reset_clears_everything() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store
        .advance(Checkpoint::new(Collection::Messages, "a", at(100)))
        .unwrap();
    store.set_outstanding(&[Collection::Receipts]).unwrap();

    store.reset().unwrap();

    assert!(store.is_empty());
    assert!(store.outstanding().is_empty());
    assert!(store_in(&temp).is_empty());
}

#[test]
fn corrupt_entry_resets_only_that_collection() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("checkpoints.json");
    let good = serde_json::to_value(Checkpoint::new(Collection::Messages, "m-1", at(10))).unwrap();
    let doc = serde_json::json!({
        "checkpoints": {
            "messages": good,
            "receipts": { "collection": "receipts", "cursor": 7 },
            "attachments": good,
        },
        "outstanding": ["conversations", "bogus"],
    });
    std::fs::write(&path, doc.to_string()).unwrap();

    let store = CheckpointStore::open(&path).unwrap();

    assert_eq!(store.all().len(), 1);
    assert_eq!(store.get(Collection::Messages).unwrap().cursor, "m-1");
    assert!(store.get(Collection::Receipts).is_none());
    assert_eq!(store.outstanding(), vec![Collection::Conversations]);
    assert_eq!(store.recovered().len(), 3);
    assert!(store
        .recovered()
        .iter()
        .all(|e| e.kind() == courier_core::ErrorKind::CorruptedState));

    // Repaired on open
    assert!(CheckpointStore::open(&path).unwrap().recovered().is_empty());
}

#[test]
fn unreadable_document_resets_all() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("checkpoints.json");
    std::fs::write(&path, "{ truncated").unwrap();

    let store = CheckpointStore::open(&path).unwrap();

    assert!(store.is_empty());
    assert_eq!(store.recovered().len(), 1);
}

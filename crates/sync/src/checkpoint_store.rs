// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable per-collection checkpoints and the outstanding-collection set.
//!
//! Stored as one JSON document rewritten atomically (temp file, fsync,
//! rename). An undecodable entry resets only its own collection.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use courier_core::{Checkpoint, Collection, Error, Result};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    checkpoints: BTreeMap<Collection, Checkpoint>,
    #[serde(default)]
    outstanding: Vec<Collection>,
}

/// File-backed checkpoint store.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: Mutex<StoredState>,
    recovered: Vec<Error>,
}

impl CheckpointStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let (state, recovered) = if path.exists() {
            let content = fs::read_to_string(path)?;
            load(path, &content)
        } else {
            (StoredState::default(), Vec::new())
        };

        for err in &recovered {
            tracing::warn!(error = %err, "checkpoint state reset");
        }

        let store = CheckpointStore {
            path: path.to_path_buf(),
            state: Mutex::new(state),
            recovered,
        };
        if !store.recovered.is_empty() {
            let snapshot = store.lock().clone();
            store.save(&snapshot)?;
        }
        Ok(store)
    }

    /// Corruption found (and repaired) while opening.
    pub fn recovered(&self) -> &[Error] {
        &self.recovered
    }

    fn lock(&self) -> MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, collection: Collection) -> Option<Checkpoint> {
        self.lock().checkpoints.get(&collection).cloned()
    }

    /// All checkpoints in priority order.
    pub fn all(&self) -> Vec<Checkpoint> {
        self.lock().checkpoints.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().checkpoints.is_empty()
    }

    /// Stores `checkpoint`. `last_synced_at` never moves backwards.
    pub fn advance(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut state = self.lock();
        let next = match state.checkpoints.get(&checkpoint.collection) {
            Some(existing) => existing.advanced(checkpoint.cursor, checkpoint.last_synced_at),
            None => checkpoint,
        };
        let mut updated = state.clone();
        updated.checkpoints.insert(next.collection, next);
        self.save(&updated)?;
        *state = updated;
        Ok(())
    }

    /// Collections whose last fetch failed or was cancelled, in priority order.
    pub fn outstanding(&self) -> Vec<Collection> {
        self.lock().outstanding.clone()
    }

    pub fn set_outstanding(&self, collections: &[Collection]) -> Result<()> {
        let mut state = self.lock();
        let mut outstanding = collections.to_vec();
        outstanding.sort();
        outstanding.dedup();
        if outstanding == state.outstanding {
            return Ok(());
        }
        let mut updated = state.clone();
        updated.outstanding = outstanding;
        self.save(&updated)?;
        *state = updated;
        Ok(())
    }

    /// Forgets every checkpoint. Only a full reset does this.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        let empty = StoredState::default();
        self.save(&empty)?;
        *state = empty;
        Ok(())
    }

    fn save(&self, state: &StoredState) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            let json = serde_json::to_string_pretty(state)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Decodes the document entry by entry so one bad checkpoint does not cost
/// the others.
fn load(path: &Path, content: &str) -> (StoredState, Vec<Error>) {
    let mut state = StoredState::default();
    let mut recovered = Vec::new();

    let doc: serde_json::Value = match serde_json::from_str(content) {
        Ok(doc) => doc,
        Err(e) => {
            recovered.push(Error::CorruptedState(format!(
                "{}: {e}; all checkpoints reset",
                path.display()
            )));
            return (state, recovered);
        }
    };

    if let Some(entries) = doc.get("checkpoints").and_then(|v| v.as_object()) {
        for (key, value) in entries {
            let decoded = key.parse::<Collection>().and_then(|collection| {
                let checkpoint: Checkpoint = serde_json::from_value(value.clone())?;
                if checkpoint.collection != collection {
                    return Err(Error::CorruptedState(format!(
                        "checkpoint stored under '{key}' is for {}",
                        checkpoint.collection
                    )));
                }
                Ok(checkpoint)
            });
            match decoded {
                Ok(checkpoint) => {
                    state.checkpoints.insert(checkpoint.collection, checkpoint);
                }
                Err(e) => recovered.push(Error::CorruptedState(format!(
                    "{}: checkpoint '{key}' reset: {e}",
                    path.display()
                ))),
            }
        }
    }

    if let Some(items) = doc.get("outstanding").and_then(|v| v.as_array()) {
        for item in items {
            match item.as_str().map(str::parse::<Collection>) {
                Some(Ok(collection)) => state.outstanding.push(collection),
                _ => recovered.push(Error::CorruptedState(format!(
                    "{}: ignoring outstanding entry {item}",
                    path.display()
                ))),
            }
        }
        state.outstanding.sort();
        state.outstanding.dedup();
    }

    (state, recovered)
}

#[cfg(test)]
#[path = "checkpoint_store_tests.rs"]
mod tests;

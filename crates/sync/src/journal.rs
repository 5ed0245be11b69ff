// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead journal backing the outbound queue.
//!
//! Each mutation is one JSONL record appended with fsync. Replaying the
//! records in order rebuilds the queue. Compaction rewrites the file as one
//! `put` per live operation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use courier_core::jsonl::{self, CorruptLine};
use courier_core::{OperationId, OperationState, QueuedOperation, Result};

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Insert or replace an operation.
    Put { op: QueuedOperation },
    /// Remove an operation.
    Remove { id: OperationId },
}

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live operations in enqueue order.
    pub ops: Vec<QueuedOperation>,
    /// Lines that could not be decoded and were skipped.
    pub corrupt: Vec<CorruptLine>,
    /// Operations that were in flight when the process stopped.
    pub recovered_in_flight: usize,
}

/// Append-only journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    /// Records in the file since the last compaction.
    lines: usize,
}

impl Journal {
    /// Opens the journal at `path` and replays it.
    ///
    /// In-flight operations come back as pending: delivery is at least once
    /// and the remote dedups by id.
    pub fn open(path: &Path) -> Result<(Journal, Replay)> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (records, corrupt) = jsonl::read_lenient::<JournalRecord>(path)?;
        let lines = records.len() + corrupt.len();

        let mut ops: Vec<QueuedOperation> = Vec::new();
        for record in records {
            match record {
                JournalRecord::Put { op } => match ops.iter_mut().find(|o| o.id == op.id) {
                    Some(existing) => *existing = op,
                    None => ops.push(op),
                },
                JournalRecord::Remove { id } => ops.retain(|o| o.id != id),
            }
        }

        let mut recovered_in_flight = 0;
        for op in ops.iter_mut() {
            if op.state == OperationState::InFlight {
                op.state = OperationState::Pending;
                recovered_in_flight += 1;
            }
        }

        let journal = Journal {
            path: path.to_path_buf(),
            lines,
        };
        Ok((
            journal,
            Replay {
                ops,
                corrupt,
                recovered_in_flight,
            },
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record; returns once it is on disk.
    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        jsonl::append(&self.path, record)?;
        self.lines += 1;
        Ok(())
    }

    /// Returns true if the file has grown past `threshold` records.
    pub fn needs_compaction(&self, threshold: usize) -> bool {
        self.lines > threshold
    }

    /// Rewrites the journal as a snapshot of `ops`.
    pub fn compact(&mut self, ops: &[QueuedOperation]) -> Result<()> {
        let records: Vec<JournalRecord> = ops
            .iter()
            .map(|op| JournalRecord::Put { op: op.clone() })
            .collect();
        jsonl::write_all(&self.path, &records)?;
        self.lines = records.len();
        Ok(())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;

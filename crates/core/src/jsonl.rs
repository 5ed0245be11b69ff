// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JSON Lines storage for write-ahead journals.
//!
//! One record per line. Appends are fsynced before returning; rewrites go
//! through a temp file and a rename. Reading tolerates damaged lines.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// A line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptLine {
    /// 1-based line number.
    pub line: usize,
    pub error: String,
}

/// Appends a record to a JSONL file with fsync for durability.
pub fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{json}")?;
    file.sync_all()?;

    Ok(())
}

/// Reads every record, collecting undecodable lines instead of failing.
/// Blank lines are skipped and a missing file reads as empty.
///
/// A torn final write after a crash, or a hand-edited line, only costs the
/// affected record.
pub fn read_lenient<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, Vec<CorruptLine>)> {
    if !path.exists() {
        return Ok((Vec::new(), Vec::new()));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut corrupt = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => corrupt.push(CorruptLine {
                line: index + 1,
                error: e.to_string(),
            }),
        }
    }

    Ok((records, corrupt))
}

/// Writes all records to a JSONL file, replacing existing content.
///
/// The records go to a sibling temp file which is fsynced and renamed over
/// the target, so readers see either the old or the new content.
pub fn write_all<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{json}")?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;

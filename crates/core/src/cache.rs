// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local entity cache.
//!
//! [`LocalCache`] is the seam the sync engine writes through. [`SqliteCache`]
//! is the SQLite-backed implementation used by the daemon.
//!
//! Conflict policy is "remote wins": applying a remote entity overwrites the
//! local row unconditionally. Rows carrying uncommitted local edits (`dirty`)
//! are overwritten too, but reported in [`ApplyOutcome::overwritten_local`]
//! so the loss is never silent.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::checkpoint::Collection;
use crate::entity::Entity;
use crate::error::{Error, Result};

/// SQL schema for the entity cache.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    body TEXT NOT NULL,
    dirty INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_entities_dirty ON entities(dirty) WHERE dirty = 1;
"#;

/// Result of applying a batch of remote entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Entities inserted or updated.
    pub upserted: usize,
    /// Tombstones that removed a row.
    pub deleted: usize,
    /// Ids whose uncommitted local edits were replaced by the remote value.
    pub overwritten_local: Vec<String>,
}

/// Local store the sync engine merges remote entities into.
pub trait LocalCache: Send + Sync {
    /// Merge remote entities into the cache (remote wins).
    fn apply(&self, collection: Collection, entities: &[Entity]) -> Result<ApplyOutcome>;

    /// Entities with local edits not yet confirmed by the remote.
    fn read_pending(&self) -> Result<Vec<Entity>>;

    /// Returns true if the cache holds no entities at all.
    fn is_empty(&self) -> Result<bool>;

    /// Remove every entity. Used by a full reset.
    fn clear(&self) -> Result<()>;
}

/// SQLite-backed [`LocalCache`].
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open a cache at the given path, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteCache {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteCache {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a local edit that has not reached the remote yet.
    pub fn mark_local(&self, entity: &Entity) -> Result<()> {
        let body = serde_json::to_string(&entity.body)?;
        self.lock().execute(
            "INSERT INTO entities (collection, id, updated_at, body, dirty)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(collection, id) DO UPDATE SET
                 updated_at = excluded.updated_at,
                 body = excluded.body,
                 dirty = 1",
            params![
                entity.collection.as_str(),
                entity.id,
                entity.updated_at.to_rfc3339(),
                body
            ],
        )?;
        Ok(())
    }

    /// Get a single entity.
    pub fn get(&self, collection: Collection, id: &str) -> Result<Option<Entity>> {
        let entity = self
            .lock()
            .query_row(
                "SELECT collection, id, updated_at, body FROM entities
                 WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// Count the entities of one collection.
    pub fn count(&self, collection: Collection) -> Result<usize> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM entities WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|_| Error::CorruptedState(format!("negative count {count}")))
    }
}

impl LocalCache for SqliteCache {
    fn apply(&self, collection: Collection, entities: &[Entity]) -> Result<ApplyOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut outcome = ApplyOutcome::default();

        for entity in entities {
            if entity.collection != collection {
                return Err(Error::Validation(format!(
                    "entity {} belongs to {}, not {}",
                    entity.id, entity.collection, collection
                )));
            }

            let dirty: Option<bool> = tx
                .query_row(
                    "SELECT dirty FROM entities WHERE collection = ?1 AND id = ?2",
                    params![collection.as_str(), entity.id],
                    |row| row.get(0),
                )
                .optional()?;
            if dirty == Some(true) {
                outcome.overwritten_local.push(entity.id.clone());
            }

            if entity.deleted {
                let removed = tx.execute(
                    "DELETE FROM entities WHERE collection = ?1 AND id = ?2",
                    params![collection.as_str(), entity.id],
                )?;
                outcome.deleted += removed;
            } else {
                let body = serde_json::to_string(&entity.body)?;
                tx.execute(
                    "INSERT INTO entities (collection, id, updated_at, body, dirty)
                     VALUES (?1, ?2, ?3, ?4, 0)
                     ON CONFLICT(collection, id) DO UPDATE SET
                         updated_at = excluded.updated_at,
                         body = excluded.body,
                         dirty = 0",
                    params![
                        collection.as_str(),
                        entity.id,
                        entity.updated_at.to_rfc3339(),
                        body
                    ],
                )?;
                outcome.upserted += 1;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn read_pending(&self) -> Result<Vec<Entity>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT collection, id, updated_at, body FROM entities
             WHERE dirty = 1 ORDER BY updated_at",
        )?;
        let entities = stmt
            .query_map([], row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn is_empty(&self) -> Result<bool> {
        let any: bool = self
            .lock()
            .query_row("SELECT EXISTS(SELECT 1 FROM entities)", [], |row| row.get(0))?;
        Ok(!any)
    }

    fn clear(&self) -> Result<()> {
        self.lock().execute("DELETE FROM entities", [])?;
        Ok(())
    }
}

/// Build an [`Entity`] from a `collection, id, updated_at, body` row.
fn row_to_entity(row: &rusqlite::Row<'_>) -> std::result::Result<Entity, rusqlite::Error> {
    let collection: String = row.get(0)?;
    let updated_at: String = row.get(2)?;
    let body: String = row.get(3)?;

    Ok(Entity {
        collection: collection
            .parse()
            .map_err(|e: Error| conversion_failure(0, e))?,
        id: row.get(1)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted: false,
        body: serde_json::from_str(&body).map_err(|e| conversion_failure(3, e.into()))?,
    })
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            conversion_failure(
                2,
                Error::CorruptedState(format!("invalid timestamp '{value}' in column 'updated_at'")),
            )
        })
}

fn conversion_failure(column: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

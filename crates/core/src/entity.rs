// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote entities exchanged between the remote store and the local cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::Collection;

/// One record of a tracked collection.
///
/// The body is opaque to the sync core; only identity, timestamp and the
/// tombstone flag are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub collection: Collection,
    pub id: String,
    pub updated_at: DateTime<Utc>,
    /// Tombstone: the remote deleted this entity.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Entity {
    pub fn new(
        collection: Collection,
        id: impl Into<String>,
        updated_at: DateTime<Utc>,
        body: serde_json::Value,
    ) -> Self {
        Entity {
            collection,
            id: id.into(),
            updated_at,
            deleted: false,
            body,
        }
    }

    /// Creates a tombstone for the given entity id.
    pub fn tombstone(collection: Collection, id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Entity {
            collection,
            id: id.into(),
            updated_at,
            deleted: true,
            body: serde_json::Value::Null,
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tracked collections and their sync checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// An entity collection mirrored from the remote store.
///
/// The declaration order is the sync priority: conversations first, so the
/// most UI-critical data becomes consistent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Conversations,
    Messages,
    /// Delivery and read receipts.
    Receipts,
    /// Contacts, blocks and group membership.
    Relationships,
}

impl Collection {
    /// All collections in priority order.
    pub const PRIORITY: [Collection; 4] = [
        Collection::Conversations,
        Collection::Messages,
        Collection::Receipts,
        Collection::Relationships,
    ];

    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Conversations => "conversations",
            Collection::Messages => "messages",
            Collection::Receipts => "receipts",
            Collection::Relationships => "relationships",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "conversations" => Ok(Collection::Conversations),
            "messages" => Ok(Collection::Messages),
            "receipts" => Ok(Collection::Receipts),
            "relationships" => Ok(Collection::Relationships),
            _ => Err(Error::InvalidCollection(s.to_string())),
        }
    }
}

/// How far synchronization of one collection has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub collection: Collection,
    /// When the collection last completed a successful fetch.
    pub last_synced_at: DateTime<Utc>,
    /// Opaque remote cursor to resume from.
    pub cursor: String,
}

impl Checkpoint {
    pub fn new(collection: Collection, cursor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Checkpoint {
            collection,
            last_synced_at: at,
            cursor: cursor.into(),
        }
    }

    /// Returns the checkpoint moved to `cursor` at time `at`.
    ///
    /// `last_synced_at` never goes backwards, even if the wall clock does.
    pub fn advanced(&self, cursor: impl Into<String>, at: DateTime<Utc>) -> Checkpoint {
        Checkpoint {
            collection: self.collection,
            last_synced_at: self.last_synced_at.max(at),
            cursor: cursor.into(),
        }
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;

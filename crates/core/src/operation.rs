// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound operation types.
//!
//! A [`QueuedOperation`] is a user action (sending a message, reacting,
//! editing) that has been accepted locally and is waiting for the remote
//! store to acknowledge it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Client-generated unique operation identifier.
pub type OperationId = String;

/// What the operation does on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Plain text message.
    Text,
    /// Reference to an already uploaded image.
    ImageRef,
    /// Reference to an already uploaded voice note.
    VoiceRef,
    Reaction,
    Edit,
    Delete,
}

impl OperationKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Text => "text",
            OperationKind::ImageRef => "image_ref",
            OperationKind::VoiceRef => "voice_ref",
            OperationKind::Reaction => "reaction",
            OperationKind::Edit => "edit",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "text" => Ok(OperationKind::Text),
            "image_ref" => Ok(OperationKind::ImageRef),
            "voice_ref" => Ok(OperationKind::VoiceRef),
            "reaction" => Ok(OperationKind::Reaction),
            "edit" => Ok(OperationKind::Edit),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

/// Delivery state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Waiting for its turn.
    Pending,
    /// Handed to the remote store, no answer yet.
    InFlight,
    /// Last attempt failed transiently; waiting for `next_eligible_at`.
    Failed,
    /// Retries exhausted or rejected permanently. Terminal until retried.
    Abandoned,
}

impl OperationState {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::InFlight => "in_flight",
            OperationState::Failed => "failed",
            OperationState::Abandoned => "abandoned",
        }
    }

    /// Returns true if the operation still counts as awaiting delivery.
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, OperationState::Abandoned)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied fields of a new operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub target_id: String,
    pub kind: OperationKind,
    pub payload: Vec<u8>,
}

impl NewOperation {
    pub fn new(target_id: impl Into<String>, kind: OperationKind, payload: impl Into<Vec<u8>>) -> Self {
        NewOperation {
            target_id: target_id.into(),
            kind,
            payload: payload.into(),
        }
    }

    /// Convenience constructor for a text message.
    pub fn text(target_id: impl Into<String>, body: &str) -> Self {
        Self::new(target_id, OperationKind::Text, body.as_bytes().to_vec())
    }
}

/// An operation persisted in the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique id; also the dedup token for the remote.
    pub id: OperationId,
    /// Conversation (or other entity) the operation is addressed to.
    pub target_id: String,
    pub kind: OperationKind,
    /// Opaque payload, hex encoded on disk.
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub next_eligible_at: DateTime<Utc>,
    pub state: OperationState,
    /// Message of the last failed attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Creates a pending operation eligible immediately.
    pub fn new(id: OperationId, op: NewOperation, created_at: DateTime<Utc>) -> Self {
        QueuedOperation {
            id,
            target_id: op.target_id,
            kind: op.kind,
            payload: op.payload,
            created_at,
            attempt_count: 0,
            next_eligible_at: created_at,
            state: OperationState::Pending,
            last_error: None,
        }
    }

    /// Returns true if a drain at `now` may send this operation.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            OperationState::Pending | OperationState::Failed => self.next_eligible_at <= now,
            OperationState::InFlight | OperationState::Abandoned => false,
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages between the client and the remote store.
//!
//! The protocol is request/response:
//! - Client sends operations and fetch requests, each with a request id
//! - Server answers each request with a message carrying the same id

use serde::{Deserialize, Serialize};

use crate::checkpoint::Collection;
use crate::entity::Entity;
use crate::operation::{OperationId, QueuedOperation};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Deliver an operation. The server dedups on `op.id`.
    Send { request_id: u64, op: QueuedOperation },

    /// Request entities changed after `cursor`.
    FetchSince {
        request_id: u64,
        collection: Collection,
        cursor: String,
    },

    /// Request the most recent `limit` entities of a collection.
    FetchSnapshot {
        request_id: u64,
        collection: Collection,
        limit: usize,
    },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The operation was accepted (or was already known).
    Ack { request_id: u64, op_id: OperationId },

    /// The operation was refused.
    Rejected {
        request_id: u64,
        op_id: OperationId,
        reason: String,
        /// True if trying again later may succeed.
        retryable: bool,
    },

    /// A page of entities answering a fetch.
    Page {
        request_id: u64,
        collection: Collection,
        entities: Vec<Entity>,
        /// Cursor to resume from after this page.
        cursor: String,
        /// More entities are available after `cursor`.
        #[serde(default)]
        has_more: bool,
    },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Request the error answers, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Human-readable error description.
        message: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl ClientMessage {
    /// Returns the request id, if this message expects a correlated answer.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::Send { request_id, .. }
            | ClientMessage::FetchSince { request_id, .. }
            | ClientMessage::FetchSnapshot { request_id, .. } => Some(*request_id),
            ClientMessage::Ping { .. } => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Returns the id of the request this message answers.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Ack { request_id, .. }
            | ServerMessage::Rejected { request_id, .. }
            | ServerMessage::Page { request_id, .. } => Some(*request_id),
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Pong { .. } => None,
        }
    }

    /// Creates an Error message not tied to a request.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id: None,
            message: message.into(),
            retryable: false,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

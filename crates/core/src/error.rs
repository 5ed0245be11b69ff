// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for courier-core operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors that can occur in courier operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanent remote error: {0}")]
    PermanentRemote(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("corrupted state: {0}")]
    CorruptedState(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("invalid collection: '{0}'\n  hint: valid collections are: conversations, messages, receipts, relationships")]
    InvalidCollection(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid kinds are: text, image_ref, voice_ref, reaction, edit, delete")]
    InvalidKind(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classification of an [`Error`] into the failure taxonomy.
///
/// Every failure surfaced by the queue or the sync engine maps to exactly one
/// kind. Only `PermanentRemote` (and abandonment, which is reported as its own
/// event) is meant to reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input. Never retried.
    Validation,
    /// Network or remote hiccup. Retried with backoff.
    TransientNetwork,
    /// Remote refused the request for good. Abandoned and surfaced.
    PermanentRemote,
    /// Scheduler-induced stop. Expected, not user visible.
    Cancellation,
    /// Durable state could not be read or written.
    CorruptedState,
}

impl ErrorKind {
    /// Returns the string representation used in logs and IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::PermanentRemote => "permanent_remote",
            ErrorKind::Cancellation => "cancellation",
            ErrorKind::CorruptedState => "corrupted_state",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Maps this error onto the failure taxonomy.
    ///
    /// Storage-layer failures (I/O, SQLite, JSON) count as corrupted state:
    /// they are recovered locally and never retried against the remote.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_)
            | Error::PayloadTooLarge { .. }
            | Error::OperationNotFound(_)
            | Error::InvalidCollection(_)
            | Error::InvalidKind(_)
            | Error::Config(_) => ErrorKind::Validation,
            Error::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Error::PermanentRemote(_) => ErrorKind::PermanentRemote,
            Error::Cancelled => ErrorKind::Cancellation,
            Error::CorruptedState(_) | Error::Database(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::CorruptedState
            }
        }
    }

    /// Returns true if the failure should be shown to the user.
    pub fn is_user_visible(&self) -> bool {
        self.kind() == ErrorKind::PermanentRemote
    }
}

/// A specialized Result type for courier-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

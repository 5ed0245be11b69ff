// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus for failures and progress the UI may want to observe.
//!
//! The queue and the engine never return per-operation or per-collection
//! failures to their callers; they publish them here instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use courier_core::{Collection, ConnectivityState, ErrorKind, OperationId};

use crate::engine::SyncReport;

const EVENT_CAPACITY: usize = 256;

/// An observable event from the sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    OperationEnqueued {
        op_id: OperationId,
        target_id: String,
    },
    OperationDelivered {
        op_id: OperationId,
        target_id: String,
    },
    /// A transient failure; the operation will be retried.
    OperationRetrying {
        op_id: OperationId,
        attempt: u32,
        next_eligible_at: DateTime<Utc>,
    },
    /// The operation will not be retried without user action.
    OperationAbandoned {
        op_id: OperationId,
        target_id: String,
        kind: ErrorKind,
        reason: String,
    },
    /// The remote refused a collection fetch for good.
    PermanentError {
        collection: Collection,
        message: String,
    },
    /// Durable state was unreadable and has been reset.
    CorruptedState { source: String, message: String },
    ConnectivityChanged { state: ConnectivityState },
    SyncCompleted { report: SyncReport },
}

impl CoreEvent {
    /// Returns true for events the UI must show to the user.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            CoreEvent::OperationAbandoned { .. } | CoreEvent::PermanentError { .. }
        )
    }
}

/// Broadcast channel shared by all components.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { tx }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

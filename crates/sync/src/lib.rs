// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! courier: offline-first delivery and sync core
//!
//! User actions are queued durably and delivered in order per target once
//! the remote store is reachable. Remote collections are mirrored into the
//! local cache through bootstrap and incremental syncs that resume from
//! persisted checkpoints. [`SyncService`] wires every component together.

pub mod backoff;
pub mod checkpoint_store;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod events;
pub mod journal;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod test_helpers;

pub use checkpoint_store::CheckpointStore;
pub use config::{
    ConnectivityConfig, CourierConfig, EngineConfig, QueueConfig, RemoteConfig, SchedulerConfig,
};
pub use connectivity::{ConnectivityMonitor, RawSignal, Subscription};
pub use engine::{
    CollectionFailure, EngineDeps, EngineStatus, SyncEngine, SyncMode, SyncReport,
};
pub use events::{CoreEvent, EventBus};
pub use queue::{DrainReport, OutboundQueue};
pub use remote::{Ack, FetchPage, RemoteError, RemoteStore, WebSocketRemote};
pub use scheduler::{BackgroundScheduler, RunOutcome, SchedulerState, SchedulerStatus};
pub use service::{ServiceDeps, ServiceStatus, SyncService, WorkItem};

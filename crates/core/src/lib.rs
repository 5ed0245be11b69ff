// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! courier-core: Shared library for the courier delivery and sync core
//!
//! This crate provides the data model, error taxonomy, durable storage
//! primitives and the remote wire protocol used by both the `courier`
//! library and the `courierd` daemon.

pub mod cache;
pub mod checkpoint;
pub mod clock;
pub mod connectivity;
pub mod entity;
pub mod error;
pub mod id;
pub mod jsonl;
pub mod operation;
pub mod protocol;

pub use cache::{ApplyOutcome, LocalCache, SqliteCache};
pub use checkpoint::{Checkpoint, Collection};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use connectivity::{ConnectivityState, LinkStatus, NetworkTransport};
pub use entity::Entity;
pub use error::{Error, ErrorKind, Result};
pub use operation::{NewOperation, OperationId, OperationKind, OperationState, QueuedOperation};

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared IPC protocol for UI-daemon communication.
//!
//! This crate defines the message types and framing protocol used between
//! user-facing clients and the `courierd` daemon. Messages are serialized
//! as JSON with length-prefixed framing.

use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier::{ServiceStatus, SyncReport};
use courier_core::{OperationId, OperationKind, OperationState, QueuedOperation};

// ============================================================================
// Model types for IPC serialization
// ============================================================================

/// A queued operation as shown to the user. The payload stays in the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationInfo {
    pub id: OperationId,
    pub target_id: String,
    pub kind: OperationKind,
    pub state: OperationState,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub next_eligible_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&QueuedOperation> for OperationInfo {
    fn from(op: &QueuedOperation) -> Self {
        OperationInfo {
            id: op.id.clone(),
            target_id: op.target_id.clone(),
            kind: op.kind,
            state: op.state,
            attempt_count: op.attempt_count,
            created_at: op.created_at,
            next_eligible_at: op.next_eligible_at,
            last_error: op.last_error.clone(),
        }
    }
}

/// Daemon status information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonStatus {
    /// Current daemon PID.
    pub pid: u32,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Remote store the daemon delivers to.
    pub remote_url: String,
    pub service: ServiceStatus,
}

impl DaemonStatus {
    pub fn new(pid: u32, uptime_secs: u64, remote_url: String, service: ServiceStatus) -> Self {
        Self {
            pid,
            uptime_secs,
            remote_url,
            service,
        }
    }
}

// ============================================================================
// Protocol types
// ============================================================================

/// Request sent from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    /// Get daemon status.
    Status,
    /// Graceful shutdown.
    Shutdown,
    /// Ping to check if daemon is alive.
    Ping,
    /// Version handshake request.
    Hello { version: String },
    /// Sync now and wait for the report. `reset` discards checkpoints and
    /// the cache first.
    SyncNow {
        #[serde(default)]
        reset: bool,
    },
    /// Queue a user action for delivery.
    Send {
        target_id: String,
        kind: OperationKind,
        body: String,
    },
    /// Give a failed or abandoned operation a fresh attempt budget.
    Retry { op_id: OperationId },
    /// Drop an abandoned operation.
    Dismiss { op_id: OperationId },
    /// List queued operations.
    ListOperations,
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Status response.
    Status(DaemonStatus),
    /// Shutdown acknowledged.
    ShuttingDown,
    /// Pong response.
    Pong,
    /// Error response.
    Error { message: String },
    /// Version handshake response.
    Hello { version: String },
    /// Sync finished.
    SyncComplete { report: SyncReport },
    /// Operation accepted into the queue.
    Enqueued { op_id: OperationId },
    /// Operation after a retry.
    Operation { operation: OperationInfo },
    Dismissed { op_id: OperationId },
    Operations { operations: Vec<OperationInfo> },
}

// ============================================================================
// Message framing
// ============================================================================

/// Maximum message size (1MB) to prevent malformed messages from causing hangs.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

fn encode<T: Serialize>(message: &T) -> io::Result<(u32, Vec<u8>)> {
    let json = serde_json::to_vec(message)
        .map_err(|e| io::Error::other(format!("serialize error: {}", e)))?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::other(format!(
            "message too large: {} bytes (max {})",
            json.len(),
            MAX_MESSAGE_SIZE
        )));
    }
    let len = u32::try_from(json.len()).map_err(|_| io::Error::other("message too large"))?;
    Ok((len, json))
}

fn check_len(len_buf: [u8; 4]) -> io::Result<usize> {
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::other(format!(
            "message too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(len)
}

fn decode<T: serde::de::DeserializeOwned>(buf: &[u8]) -> io::Result<T> {
    serde_json::from_slice(buf).map_err(|e| io::Error::other(format!("deserialize error: {}", e)))
}

/// IPC message framing.
///
/// Messages are framed as:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON-encoded message
pub mod framing {
    use std::io::{Read, Write};

    use serde::de::DeserializeOwned;
    use serde::Serialize;

    /// Write a serializable message to the given writer.
    pub fn write_message<W: Write, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        let (len, json) = super::encode(message)?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&json)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = super::check_len(len_buf)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        super::decode(&buf)
    }
}

/// The same framing over tokio streams, used by the daemon's listener.
pub mod framing_async {
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use super::{DaemonRequest, DaemonResponse};

    pub async fn read_request<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> std::io::Result<DaemonRequest> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = super::check_len(len_buf)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        super::decode(&buf)
    }

    pub async fn write_response<W: AsyncWrite + Unpin>(
        writer: &mut W,
        response: &DaemonResponse,
    ) -> std::io::Result<()> {
        let (len, json) = super::encode(response)?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(&json).await?;
        writer.flush().await?;
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Default timeout for daemon communication.
const TIMEOUT_SECS: u64 = 5;

/// Errors from [`DaemonClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to daemon: {0}")]
    Connect(io::Error),

    #[error("daemon I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Daemon(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// A client connection to the daemon. One request per connection.
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect to the daemon at the given socket path.
    pub fn connect(socket_path: &Path) -> ClientResult<Self> {
        Self::connect_with_timeout(socket_path, Duration::from_secs(TIMEOUT_SECS))
    }

    /// Connect with a custom read timeout; syncs can take longer than the
    /// default.
    pub fn connect_with_timeout(socket_path: &Path, timeout: Duration) -> ClientResult<Self> {
        let stream = UnixStream::connect(socket_path).map_err(ClientError::Connect)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(Duration::from_secs(TIMEOUT_SECS)))?;
        Ok(DaemonClient { stream })
    }

    /// Send a request and receive a response.
    pub fn request(mut self, request: &DaemonRequest) -> ClientResult<DaemonResponse> {
        framing::write_message(&mut self.stream, request)?;
        let response = framing::read_message(&mut self.stream)?;
        match response {
            DaemonResponse::Error { message } => Err(ClientError::Daemon(message)),
            other => Ok(other),
        }
    }

    pub fn status(self) -> ClientResult<DaemonStatus> {
        match self.request(&DaemonRequest::Status)? {
            DaemonResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub fn sync_now(self, reset: bool) -> ClientResult<SyncReport> {
        match self.request(&DaemonRequest::SyncNow { reset })? {
            DaemonResponse::SyncComplete { report } => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub fn send(self, target_id: &str, kind: OperationKind, body: &str) -> ClientResult<OperationId> {
        let request = DaemonRequest::Send {
            target_id: target_id.to_string(),
            kind,
            body: body.to_string(),
        };
        match self.request(&request)? {
            DaemonResponse::Enqueued { op_id } => Ok(op_id),
            other => Err(unexpected(other)),
        }
    }

    pub fn retry(self, op_id: &str) -> ClientResult<OperationInfo> {
        let request = DaemonRequest::Retry {
            op_id: op_id.to_string(),
        };
        match self.request(&request)? {
            DaemonResponse::Operation { operation } => Ok(operation),
            other => Err(unexpected(other)),
        }
    }

    pub fn dismiss(self, op_id: &str) -> ClientResult<()> {
        let request = DaemonRequest::Dismiss {
            op_id: op_id.to_string(),
        };
        match self.request(&request)? {
            DaemonResponse::Dismissed { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn list_operations(self) -> ClientResult<Vec<OperationInfo>> {
        match self.request(&DaemonRequest::ListOperations)? {
            DaemonResponse::Operations { operations } => Ok(operations),
            other => Err(unexpected(other)),
        }
    }

    pub fn ping(self) -> ClientResult<()> {
        match self.request(&DaemonRequest::Ping)? {
            DaemonResponse::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Version handshake; returns the daemon's version.
    pub fn hello(self, version: &str) -> ClientResult<String> {
        let request = DaemonRequest::Hello {
            version: version.to_string(),
        };
        match self.request(&request)? {
            DaemonResponse::Hello { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub fn shutdown(self) -> ClientResult<()> {
        match self.request(&DaemonRequest::Shutdown)? {
            DaemonResponse::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: DaemonResponse) -> ClientError {
    ClientError::UnexpectedResponse(format!("{:?}", response))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

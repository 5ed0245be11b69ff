// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote store abstraction and its WebSocket adapter.
//!
//! The queue and the engine only see [`RemoteStore`]. Every failure is
//! classified as [`RemoteError::Transient`] (retry later) or
//! [`RemoteError::Permanent`] (do not retry).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use courier_core::protocol::{ClientMessage, ServerMessage};
use courier_core::{Checkpoint, Collection, Entity, Error, OperationId, QueuedOperation};

use crate::config::RemoteConfig;

/// Failure reported by a remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Connection problem, timeout, or a refusal the remote marked retryable.
    #[error("{0}")]
    Transient(String),
    /// The remote refused the request and will keep refusing it.
    #[error("{0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transient(msg) => Error::TransientNetwork(msg),
            RemoteError::Permanent(msg) => Error::PermanentRemote(msg),
        }
    }
}

/// Remote acknowledgment of a delivered operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub op_id: OperationId,
}

/// One page of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPage {
    pub entities: Vec<Entity>,
    /// Cursor to store in the checkpoint after applying this page.
    pub cursor: String,
    pub has_more: bool,
}

/// The authoritative remote store.
pub trait RemoteStore: Send + Sync {
    /// Deliver one operation. The remote dedups on `op.id`.
    fn send(&self, op: QueuedOperation) -> BoxFuture<'_, Result<Ack, RemoteError>>;

    /// Entities of `collection` changed after `checkpoint`.
    fn fetch_since(
        &self,
        collection: Collection,
        checkpoint: Checkpoint,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>>;

    /// The most recent `limit` entities of `collection`.
    fn fetch_snapshot(
        &self,
        collection: Collection,
        limit: usize,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type PendingReplies = HashMap<u64, oneshot::Sender<Result<ServerMessage, RemoteError>>>;

/// An open connection. Requests are pipelined: the sink is locked only to
/// write a frame, and a reader task routes each reply to its waiting
/// request by request id.
struct WebSocketConnection {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<Mutex<PendingReplies>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WebSocketConnection {
    async fn open(url: &str) -> Result<Self, RemoteError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RemoteError::Transient(format!("connection failed: {e}")))?;
        let (sink, stream) = ws_stream.split();
        let pending = Arc::new(Mutex::new(PendingReplies::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_replies(stream, pending.clone(), closed.clone()));
        Ok(WebSocketConnection {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            closed,
            reader,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Registers interest in the reply to `request_id`.
    fn expect_reply(&self, request_id: u64) -> oneshot::Receiver<Result<ServerMessage, RemoteError>> {
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(request_id, tx);
        rx
    }

    fn forget(&self, request_id: u64) {
        lock_pending(&self.pending).remove(&request_id);
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), RemoteError> {
        let json = msg
            .to_json()
            .map_err(|e| RemoteError::Permanent(format!("serialization error: {e}")))?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| RemoteError::Transient(format!("send failed: {e}")))?;
        // Flush so a broken connection is detected here rather than on recv
        sink.flush()
            .await
            .map_err(|e| RemoteError::Transient(format!("send failed: {e}")))
    }

    /// Stops the reader and fails every request still waiting.
    async fn shutdown(&self, reason: &str) {
        self.reader.abort();
        self.closed.store(true, Ordering::Release);
        fail_pending(&self.pending, &RemoteError::Transient(reason.to_string()));
        let _ = self.sink.lock().await.close().await;
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock_pending(pending: &Mutex<PendingReplies>) -> MutexGuard<'_, PendingReplies> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn fail_pending(pending: &Mutex<PendingReplies>, err: &RemoteError) {
    for (_, tx) in lock_pending(pending).drain() {
        let _ = tx.send(Err(err.clone()));
    }
}

async fn read_replies(
    mut stream: SplitStream<WsStream>,
    pending: Arc<Mutex<PendingReplies>>,
    closed: Arc<AtomicBool>,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                Ok(reply) => route_reply(&pending, reply),
                Err(e) => tracing::warn!(error = %e, "malformed server message"),
            },
            Some(Ok(Message::Close(_))) | None => {
                break RemoteError::Transient("connection closed".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break RemoteError::Transient(format!("receive failed: {e}")),
        }
    };
    tracing::debug!(reason = %reason, "remote connection lost");
    closed.store(true, Ordering::Release);
    fail_pending(&pending, &reason);
}

fn route_reply(pending: &Mutex<PendingReplies>, reply: ServerMessage) {
    match reply.request_id() {
        Some(id) => match lock_pending(pending).remove(&id) {
            Some(tx) => {
                let _ = tx.send(Ok(reply));
            }
            None => tracing::trace!(?reply, "skipping uncorrelated server message"),
        },
        // An error not tied to a request answers everything in flight
        None if matches!(reply, ServerMessage::Error { .. }) => {
            for (_, tx) in lock_pending(pending).drain() {
                let _ = tx.send(Ok(reply.clone()));
            }
        }
        None => tracing::trace!(?reply, "skipping uncorrelated server message"),
    }
}

/// [`RemoteStore`] over a single WebSocket connection.
///
/// The connection is opened lazily on the first request and dropped on any
/// transport failure or timeout; the next request reconnects. Requests from
/// different callers are in flight together and correlated by request id,
/// so a slow reply only delays its own caller.
pub struct WebSocketRemote {
    url: String,
    request_timeout: Duration,
    conn: tokio::sync::Mutex<Option<Arc<WebSocketConnection>>>,
    next_request_id: AtomicU64,
}

impl WebSocketRemote {
    pub fn new(config: &RemoteConfig) -> Self {
        WebSocketRemote {
            url: config.url.clone(),
            request_timeout: config.request_timeout(),
            conn: tokio::sync::Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Returns true if a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| !conn.is_closed())
    }

    /// Close the connection, if any.
    pub async fn disconnect(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.shutdown("disconnected").await;
        }
    }

    fn request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The open connection, connecting first if there is none.
    async fn connection(&self) -> Result<Arc<WebSocketConnection>, RemoteError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref().filter(|conn| !conn.is_closed()) {
            return Ok(conn.clone());
        }
        tracing::debug!(url = %self.url, "connecting to remote");
        let conn = Arc::new(WebSocketConnection::open(&self.url).await?);
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drops `conn` if it is still the current connection.
    async fn discard(&self, conn: &Arc<WebSocketConnection>, reason: &str) {
        {
            let mut slot = self.conn.lock().await;
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, conn)) {
                *slot = None;
            }
        }
        conn.shutdown(reason).await;
    }

    fn timed_out(&self) -> RemoteError {
        RemoteError::Transient(format!(
            "no response within {}s",
            self.request_timeout.as_secs()
        ))
    }

    async fn request(&self, msg: ClientMessage) -> Result<ServerMessage, RemoteError> {
        let request_id = msg
            .request_id()
            .ok_or_else(|| RemoteError::Permanent("message expects no reply".to_string()))?;
        let deadline = tokio::time::Instant::now() + self.request_timeout;

        let conn = match tokio::time::timeout_at(deadline, self.connection()).await {
            Ok(conn) => conn?,
            Err(_) => return Err(self.timed_out()),
        };

        let reply = conn.expect_reply(request_id);
        let exchange = async {
            conn.send(&msg).await?;
            reply
                .await
                .map_err(|_| RemoteError::Transient("connection closed".to_string()))?
        };

        let result = match tokio::time::timeout_at(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        };

        if let Err(err) = &result {
            conn.forget(request_id);
            if err.is_transient() {
                self.discard(&conn, &err.to_string()).await;
            }
        }
        result
    }

    async fn fetch(&self, msg: ClientMessage) -> Result<FetchPage, RemoteError> {
        match self.request(msg).await? {
            ServerMessage::Page {
                entities,
                cursor,
                has_more,
                ..
            } => Ok(FetchPage {
                entities,
                cursor,
                has_more,
            }),
            other => Err(unexpected_reply(other)),
        }
    }
}

impl RemoteStore for WebSocketRemote {
    fn send(&self, op: QueuedOperation) -> BoxFuture<'_, Result<Ack, RemoteError>> {
        async move {
            let request_id = self.request_id();
            let expected = op.id.clone();
            match self.request(ClientMessage::Send { request_id, op }).await? {
                ServerMessage::Ack { op_id, .. } if op_id == expected => Ok(Ack { op_id }),
                ServerMessage::Ack { op_id, .. } => Err(RemoteError::Transient(format!(
                    "ack for {op_id} answered send of {expected}"
                ))),
                ServerMessage::Rejected {
                    reason, retryable, ..
                } => Err(refusal(reason, retryable)),
                other => Err(unexpected_reply(other)),
            }
        }
        .boxed()
    }

    fn fetch_since(
        &self,
        collection: Collection,
        checkpoint: Checkpoint,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>> {
        async move {
            let request_id = self.request_id();
            self.fetch(ClientMessage::FetchSince {
                request_id,
                collection,
                cursor: checkpoint.cursor,
            })
            .await
        }
        .boxed()
    }

    fn fetch_snapshot(
        &self,
        collection: Collection,
        limit: usize,
    ) -> BoxFuture<'_, Result<FetchPage, RemoteError>> {
        async move {
            let request_id = self.request_id();
            self.fetch(ClientMessage::FetchSnapshot {
                request_id,
                collection,
                limit,
            })
            .await
        }
        .boxed()
    }
}

fn refusal(reason: String, retryable: bool) -> RemoteError {
    if retryable {
        RemoteError::Transient(reason)
    } else {
        RemoteError::Permanent(reason)
    }
}

fn unexpected_reply(reply: ServerMessage) -> RemoteError {
    match reply {
        ServerMessage::Error {
            message, retryable, ..
        } => refusal(message, retryable),
        other => RemoteError::Transient(format!("unexpected response: {other:?}")),
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;

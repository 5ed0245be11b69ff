// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon main loop: wires the sync service to its adapters and serves IPC.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use courier::{CourierConfig, ServiceDeps, SyncService, WebSocketRemote};
use courier_core::{NewOperation, SqliteCache, SystemClock};
use courier_ipc::{framing_async, DaemonRequest, DaemonResponse, DaemonStatus, OperationInfo};

use crate::error::Result;
use crate::lifecycle::{acquire_lock, cleanup, read_pid, write_pid_file};
use crate::paths::StatePaths;
use crate::probe::ReachabilityProbe;

/// State shared by IPC handlers.
pub struct Daemon {
    service: Arc<SyncService>,
    remote_url: String,
    pid: u32,
    start_time: Instant,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(service: Arc<SyncService>, remote_url: String, shutdown: CancellationToken) -> Self {
        Daemon {
            service,
            remote_url,
            pid: std::process::id(),
            start_time: Instant::now(),
            shutdown,
        }
    }

    /// Serves one request on `stream`.
    pub async fn handle_connection(&self, mut stream: UnixStream) -> std::io::Result<()> {
        let request = framing_async::read_request(&mut stream).await?;
        tracing::debug!(?request, "ipc request");
        let response = self.handle(request).await;
        let should_shutdown = matches!(response, DaemonResponse::ShuttingDown);
        framing_async::write_response(&mut stream, &response).await?;
        if should_shutdown {
            tracing::info!("shutdown requested");
            self.shutdown.cancel();
        }
        Ok(())
    }

    pub async fn handle(&self, request: DaemonRequest) -> DaemonResponse {
        match request {
            DaemonRequest::Ping => DaemonResponse::Pong,
            DaemonRequest::Hello { version } => {
                let ours = env!("CARGO_PKG_VERSION");
                if version != ours {
                    tracing::warn!(client = %version, daemon = ours, "client version differs");
                }
                DaemonResponse::Hello {
                    version: ours.to_string(),
                }
            }
            DaemonRequest::Status => DaemonResponse::Status(DaemonStatus::new(
                self.pid,
                self.start_time.elapsed().as_secs(),
                self.remote_url.clone(),
                self.service.status(),
            )),
            DaemonRequest::Shutdown => DaemonResponse::ShuttingDown,
            DaemonRequest::SyncNow { reset } => {
                let report = if reset {
                    self.service.full_reset().await
                } else {
                    self.service.sync_now().await
                };
                DaemonResponse::SyncComplete { report }
            }
            DaemonRequest::Send {
                target_id,
                kind,
                body,
            } => match self
                .service
                .send(NewOperation::new(target_id, kind, body.into_bytes()))
            {
                Ok(op_id) => DaemonResponse::Enqueued { op_id },
                Err(e) => error_response(e),
            },
            DaemonRequest::Retry { op_id } => match self.service.retry(&op_id) {
                Ok(op) => DaemonResponse::Operation {
                    operation: OperationInfo::from(&op),
                },
                Err(e) => error_response(e),
            },
            DaemonRequest::Dismiss { op_id } => match self.service.dismiss(&op_id) {
                Ok(()) => DaemonResponse::Dismissed { op_id },
                Err(e) => error_response(e),
            },
            DaemonRequest::ListOperations => DaemonResponse::Operations {
                operations: self
                    .service
                    .list_operations()
                    .iter()
                    .map(OperationInfo::from)
                    .collect(),
            },
        }
    }
}

fn error_response(e: courier_core::Error) -> DaemonResponse {
    DaemonResponse::Error {
        message: e.to_string(),
    }
}

/// Accepts IPC connections until `shutdown` fires or a termination signal
/// arrives. Each connection is served on its own task so a long sync does
/// not block status queries.
pub async fn serve(listener: UnixListener, daemon: Arc<Daemon>, shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                shutdown.cancel();
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("terminated");
                shutdown.cancel();
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let daemon = Arc::clone(&daemon);
                    tokio::spawn(async move {
                        if let Err(e) = daemon.handle_connection(stream).await {
                            tracing::warn!(error = %e, "failed to serve ipc request");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            },
        }
    }
    Ok(())
}

/// Runs the daemon until shutdown.
pub async fn run(paths: &StatePaths, config: CourierConfig) -> Result<()> {
    paths.ensure()?;
    let lock_file = acquire_lock(&paths.lock()).inspect_err(|_| {
        tracing::error!(pid = ?read_pid(&paths.pid()), "another daemon holds the state directory");
    })?;
    write_pid_file(&paths.pid())?;

    // Remove stale socket if it exists
    let _ = fs::remove_file(paths.socket());
    let listener = match UnixListener::bind(paths.socket()) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind socket");
            cleanup(paths);
            return Err(e.into());
        }
    };
    tracing::info!(socket = %paths.socket().display(), "listening");

    let result = run_service(paths, &config, listener).await;

    cleanup(paths);
    drop(lock_file);
    tracing::info!("courierd stopped");
    result
}

async fn run_service(paths: &StatePaths, config: &CourierConfig, listener: UnixListener) -> Result<()> {
    let cache = SqliteCache::open(&paths.cache())?;
    let service = Arc::new(SyncService::new(
        config,
        ServiceDeps {
            remote: Arc::new(WebSocketRemote::new(&config.remote)),
            cache: Arc::new(cache),
            clock: Arc::new(SystemClock),
            queue_path: paths.queue(),
            checkpoint_path: paths.checkpoints(),
        },
    )?);

    // Signal readiness to a supervising parent
    println!("READY");
    let _ = std::io::stdout().flush();

    let shutdown = CancellationToken::new();
    let service_task = tokio::spawn({
        let service = Arc::clone(&service);
        let shutdown = shutdown.clone();
        async move { service.run(shutdown).await }
    });

    let probe_task = match ReachabilityProbe::from_config(config) {
        Some(probe) => {
            let service = Arc::clone(&service);
            Some(tokio::spawn(probe.run(
                move |signal| service.report_connectivity(signal),
                shutdown.clone(),
            )))
        }
        None => {
            tracing::warn!(url = %config.remote.url, "remote has no probeable host; assuming reachable");
            None
        }
    };

    let daemon = Arc::new(Daemon::new(
        Arc::clone(&service),
        config.remote.url.clone(),
        shutdown.clone(),
    ));
    let served = serve(listener, daemon, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = service_task.await {
        tracing::warn!(error = %e, "sync service task failed");
    }
    if let Some(task) = probe_task {
        let _ = task.await;
    }
    served
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! TCP reachability probe feeding the connectivity monitor.
//!
//! A desktop host has no platform connectivity callback, so the daemon
//! periodically opens a TCP connection to the remote's host and reports the
//! result as a raw signal. The monitor debounces and dedups.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use courier::{CourierConfig, RawSignal};
use courier_core::NetworkTransport;

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ReachabilityProbe {
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    sequence: u64,
}

impl ReachabilityProbe {
    /// None when the remote URL has no usable host.
    pub fn from_config(config: &CourierConfig) -> Option<Self> {
        let (host, port) = config.remote.host_port()?;
        Some(Self::new(host, port, config.connectivity.probe_interval()))
    }

    pub fn new(host: String, port: u16, interval: Duration) -> Self {
        ReachabilityProbe {
            host,
            port,
            interval,
            timeout: CONNECT_TIMEOUT.min(interval.max(Duration::from_millis(100))),
            sequence: 0,
        }
    }

    /// Probes once and returns the signal to report.
    pub async fn check(&mut self) -> RawSignal {
        self.sequence += 1;
        let addr = (self.host.as_str(), self.port);
        let reachable = matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        );
        tracing::trace!(host = %self.host, port = self.port, reachable, "reachability probe");
        if reachable {
            RawSignal::connected(NetworkTransport::Unknown, false, self.sequence)
        } else {
            RawSignal::disconnected(self.sequence)
        }
    }

    /// Probes every interval and hands each signal to `report` until
    /// `shutdown` fires.
    pub async fn run(mut self, report: impl Fn(RawSignal), shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let signal = tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = self.check() => signal,
            };
            report(signal);
        }
        tracing::debug!("reachability probe stopped");
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;

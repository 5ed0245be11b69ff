// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use super::*;
use courier_core::LinkStatus;
use tokio::net::TcpListener;

fn status(signal: RawSignal) -> Option<(LinkStatus, u64)> {
    match signal {
        RawSignal::Changed {
            status, sequence, ..
        } => Some((status, sequence)),
        RawSignal::Unavailable => None,
    }
}

#[tokio::test]
async fn open_port_is_reachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut probe = ReachabilityProbe::new("127.0.0.1".into(), port, Duration::from_secs(1));

    assert_eq!(status(probe.check().await), Some((LinkStatus::Connected, 1)));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let mut probe = ReachabilityProbe::new("127.0.0.1".into(), port, Duration::from_secs(1));

    assert_eq!(
        status(probe.check().await),
        Some((LinkStatus::Disconnected, 1))
    );
}

#[tokio::test]
async fn sequence_increases_per_probe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut probe = ReachabilityProbe::new("127.0.0.1".into(), port, Duration::from_secs(1));

    let first = status(probe.check().await).unwrap().1;
    let second = status(probe.check().await).unwrap().1;
    assert!(second > first);
}

#[test]
fn from_config_uses_remote_host() {
    let mut config = CourierConfig::default();
    config.remote.url = "wss://sync.example.com/v1".into();
    let probe = ReachabilityProbe::from_config(&config).unwrap();
    assert_eq!(probe.host, "sync.example.com");
    assert_eq!(probe.port, 443);
    assert_eq!(probe.interval, Duration::from_secs(15));
}

#[test]
fn from_config_without_host_is_none() {
    let mut config = CourierConfig::default();
    config.remote.url = "ws://".into();
    assert!(ReachabilityProbe::from_config(&config).is_none());
}

#[tokio::test]
async fn run_reports_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let probe = ReachabilityProbe::new("127.0.0.1".into(), port, Duration::from_millis(20));

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(probe.run(
        move |signal| sink.lock().unwrap().push(signal),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    task.await.unwrap();

    let reported = reported.lock().unwrap();
    assert!(reported.len() >= 2);
    assert!(reported
        .iter()
        .all(|s| matches!(status(*s), Some((LinkStatus::Connected, _)))));
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity monitor.
//!
//! The platform reports raw reachability through
//! [`ConnectivityMonitor::report`], which never blocks: signals go onto a
//! channel and a background task debounces them and publishes the result on
//! a watch channel. Readers take a synchronous snapshot with
//! [`ConnectivityMonitor::current_state`] or follow transitions with a
//! [`Subscription`].

use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use courier_core::{ConnectivityState, LinkStatus, NetworkTransport};

use crate::config::ConnectivityConfig;

/// A raw platform notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSignal {
    Changed {
        status: LinkStatus,
        transport: NetworkTransport,
        metered: bool,
        /// Platform ordering token; lower than the last applied means stale.
        sequence: u64,
    },
    /// The platform cannot tell; assume reachable.
    Unavailable,
}

impl RawSignal {
    pub fn connected(transport: NetworkTransport, metered: bool, sequence: u64) -> Self {
        RawSignal::Changed {
            status: LinkStatus::Connected,
            transport,
            metered,
            sequence,
        }
    }

    pub fn disconnected(sequence: u64) -> Self {
        RawSignal::Changed {
            status: LinkStatus::Disconnected,
            transport: NetworkTransport::Unknown,
            metered: false,
            sequence,
        }
    }

    fn sequence(&self) -> Option<u64> {
        match self {
            RawSignal::Changed { sequence, .. } => Some(*sequence),
            RawSignal::Unavailable => None,
        }
    }

    fn into_state(self, last_sequence: u64) -> ConnectivityState {
        match self {
            RawSignal::Changed {
                status,
                transport,
                metered,
                sequence,
            } => ConnectivityState {
                status,
                transport,
                metered,
                sequence,
            },
            RawSignal::Unavailable => ConnectivityState::assume_reachable(last_sequence),
        }
    }
}

/// Publishes the debounced connectivity state.
pub struct ConnectivityMonitor {
    state_rx: watch::Receiver<ConnectivityState>,
    signal_tx: mpsc::UnboundedSender<RawSignal>,
}

impl ConnectivityMonitor {
    /// Starts the monitor. Until the platform reports anything the state is
    /// "connected, transport unknown".
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ConnectivityConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectivityState::assume_reachable(0));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce_loop(signal_rx, state_tx, config.stability_window()));
        ConnectivityMonitor {
            state_rx,
            signal_tx,
        }
    }

    /// Platform callback entry point. Never blocks.
    pub fn report(&self, signal: RawSignal) {
        if self.signal_tx.send(signal).is_err() {
            tracing::debug!(?signal, "connectivity monitor stopped; signal dropped");
        }
    }

    pub fn current_state(&self) -> ConnectivityState {
        *self.state_rx.borrow()
    }

    /// Follows transitions, starting with the current state.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.state_rx.clone(),
            primed: false,
        }
    }
}

/// A restartable sequence of connectivity states.
///
/// The first item is the state at subscription time; later items are the
/// debounced transitions. Dropping it has no side effects.
pub struct Subscription {
    rx: watch::Receiver<ConnectivityState>,
    primed: bool,
}

impl Subscription {
    /// Next state, or `None` once the monitor is gone.
    pub async fn next(&mut self) -> Option<ConnectivityState> {
        if !self.primed {
            self.primed = true;
            return Some(*self.rx.borrow_and_update());
        }
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn into_stream(self) -> impl Stream<Item = ConnectivityState> {
        stream::unfold(self, |mut sub| async move {
            let state = sub.next().await?;
            Some((state, sub))
        })
    }
}

/// Applies raw signals, collapsing any burst that settles within `window`
/// to its last value.
async fn debounce_loop(
    mut signals: mpsc::UnboundedReceiver<RawSignal>,
    state_tx: watch::Sender<ConnectivityState>,
    window: Duration,
) {
    let mut last_sequence = 0u64;

    while let Some(first) = signals.recv().await {
        let Some(mut latest) = accept(first, last_sequence) else {
            continue;
        };
        if let Some(seq) = latest.sequence() {
            last_sequence = seq;
        }

        let settle = tokio::time::sleep(window);
        tokio::pin!(settle);
        let mut closed = false;
        loop {
            tokio::select! {
                biased;
                next = signals.recv() => match next {
                    Some(signal) => {
                        if let Some(signal) = accept(signal, last_sequence) {
                            if let Some(seq) = signal.sequence() {
                                last_sequence = seq;
                            }
                            latest = signal;
                            settle.as_mut().reset(Instant::now() + window);
                        }
                    }
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = &mut settle => break,
            }
        }

        publish(&state_tx, latest.into_state(last_sequence));
        if closed {
            break;
        }
    }
}

fn accept(signal: RawSignal, last_sequence: u64) -> Option<RawSignal> {
    match signal.sequence() {
        Some(seq) if seq < last_sequence => {
            tracing::debug!(seq, last_sequence, "dropping stale connectivity signal");
            None
        }
        _ => Some(signal),
    }
}

fn publish(state_tx: &watch::Sender<ConnectivityState>, next: ConnectivityState) {
    state_tx.send_if_modified(|current| {
        let changed = !current.same_link(&next);
        if changed {
            tracing::info!(from = %current, to = %next, "connectivity changed");
        }
        // Keep the newest sequence even when the link itself is unchanged
        *current = next;
        changed
    });
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;

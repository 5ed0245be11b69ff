// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity state published by the connectivity monitor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether the remote store is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Physical transport the platform reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkTransport {
    Wifi,
    Cellular,
    Other,
    Unknown,
}

impl NetworkTransport {
    /// Returns the string representation used in logs and IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkTransport::Wifi => "wifi",
            NetworkTransport::Cellular => "cellular",
            NetworkTransport::Other => "other",
            NetworkTransport::Unknown => "unknown",
        }
    }
}

/// A snapshot of connectivity.
///
/// `sequence` increases with every applied transition; consumers can use it
/// to discard notifications older than the state they already hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub status: LinkStatus,
    pub transport: NetworkTransport,
    /// Bandwidth is billed. Advisory only; callers decide what to defer.
    pub metered: bool,
    pub sequence: u64,
}

impl ConnectivityState {
    /// The state assumed when the platform signal is unavailable:
    /// reachable over an unknown transport.
    pub fn assume_reachable(sequence: u64) -> Self {
        ConnectivityState {
            status: LinkStatus::Connected,
            transport: NetworkTransport::Unknown,
            metered: false,
            sequence,
        }
    }

    /// A disconnected state.
    pub fn disconnected(sequence: u64) -> Self {
        ConnectivityState {
            status: LinkStatus::Disconnected,
            transport: NetworkTransport::Unknown,
            metered: false,
            sequence,
        }
    }

    /// Returns true if network attempts should be made.
    pub fn is_reachable(&self) -> bool {
        self.status == LinkStatus::Connected
    }

    /// Returns true if `other` describes the same link, ignoring `sequence`.
    pub fn same_link(&self, other: &ConnectivityState) -> bool {
        self.status == other.status
            && self.transport == other.transport
            && self.metered == other.metered
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            LinkStatus::Connected => "connected",
            LinkStatus::Disconnected => "disconnected",
        };
        write!(f, "{} ({}", status, self.transport.as_str())?;
        if self.metered {
            write!(f, ", metered")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;

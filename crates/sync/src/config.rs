// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Policy configuration for the sync core.
//!
//! Every field has a serde default so a partial (or empty) `config.toml`
//! section is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration, one table per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub sync: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

/// Remote store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,
    /// How long to wait for the answer to one request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns an error message if the URL is not a WebSocket URL.
    pub fn validate_url(&self) -> Option<String> {
        if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            None
        } else {
            Some(format!(
                "invalid remote URL '{}': must start with ws:// or wss://",
                self.url
            ))
        }
    }

    /// Host and port of the remote, used by the reachability probe.
    pub fn host_port(&self) -> Option<(String, u16)> {
        let (rest, default_port) = if let Some(rest) = self.url.strip_prefix("wss://") {
            (rest, 443)
        } else if let Some(rest) = self.url.strip_prefix("ws://") {
            (rest, 80)
        } else {
            return None;
        };
        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.is_empty() {
            return None;
        }
        match authority.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse().ok()?;
                Some((host.to_string(), port))
            }
            Some(_) => None,
            None => Some((authority.to_string(), default_port)),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Outbound queue policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts before an operation is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Targets drained concurrently.
    #[serde(default = "default_drain_parallelism")]
    pub drain_parallelism: usize,
    /// Journal lines before the journal is rewritten as a snapshot.
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_attempts: default_max_attempts(),
            max_payload_bytes: default_max_payload_bytes(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter: true,
            drain_parallelism: default_drain_parallelism(),
            compact_threshold: default_compact_threshold(),
        }
    }
}

/// Sync engine policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Entities fetched per collection by a bootstrap.
    #[serde(default = "default_bootstrap_window")]
    pub bootstrap_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bootstrap_window: default_bootstrap_window(),
        }
    }
}

/// Background scheduler policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum time between the starts of two runs.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Execution budget of one run.
    #[serde(default = "default_max_run_secs")]
    pub max_run_secs: u64,
    /// Cancel this long before the deadline.
    #[serde(default = "default_cancel_margin_ms")]
    pub cancel_margin_ms: u64,
}

impl SchedulerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn max_run(&self) -> Duration {
        Duration::from_secs(self.max_run_secs)
    }

    pub fn cancel_margin(&self) -> Duration {
        Duration::from_millis(self.cancel_margin_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            min_interval_secs: default_min_interval_secs(),
            max_run_secs: default_max_run_secs(),
            cancel_margin_ms: default_cancel_margin_ms(),
        }
    }
}

/// Connectivity monitor policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Raw transitions inside this window collapse to the last one.
    #[serde(default = "default_stability_window_ms")]
    pub stability_window_ms: u64,
    /// Interval of the daemon's reachability probe.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl ConnectivityConfig {
    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            stability_window_ms: default_stability_window_ms(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_payload_bytes() -> usize {
    256 * 1024
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}

fn default_drain_parallelism() -> usize {
    4
}

fn default_compact_threshold() -> usize {
    512
}

fn default_bootstrap_window() -> usize {
    200
}

fn default_min_interval_secs() -> u64 {
    15 * 60
}

fn default_max_run_secs() -> u64 {
    30
}

fn default_cancel_margin_ms() -> u64 {
    2_000
}

fn default_stability_window_ms() -> u64 {
    1_000
}

fn default_probe_interval_secs() -> u64 {
    15
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

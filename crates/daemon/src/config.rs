// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Loading `config.toml`.

use std::fs;
use std::path::Path;

use courier::CourierConfig;

use crate::error::{Error, Result};

/// Loads the config file at `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<CourierConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(CourierConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
    parse(&content)
}

/// Parses and validates a config document.
pub fn parse(content: &str) -> Result<CourierConfig> {
    let config: CourierConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &CourierConfig) -> Result<()> {
    if let Some(msg) = config.remote.validate_url() {
        return Err(Error::Config(msg));
    }
    if config.queue.max_attempts == 0 {
        return Err(Error::Config("queue.max_attempts must be at least 1".into()));
    }
    if config.queue.drain_parallelism == 0 {
        return Err(Error::Config(
            "queue.drain_parallelism must be at least 1".into(),
        ));
    }
    if config.queue.backoff_base_ms > config.queue.backoff_max_ms {
        return Err(Error::Config(
            "queue.backoff_base_ms must not exceed queue.backoff_max_ms".into(),
        ));
    }
    if config.scheduler.cancel_margin() >= config.scheduler.max_run() {
        return Err(Error::Config(
            "scheduler.cancel_margin_ms must be shorter than scheduler.max_run_secs".into(),
        ));
    }
    if config.sync.bootstrap_window == 0 {
        return Err(Error::Config("sync.bootstrap_window must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

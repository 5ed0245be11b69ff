// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry delay calculation for the outbound queue.

use std::time::Duration;

use crate::config::QueueConfig;

/// Delay before retry number `attempt` (1-based), without jitter:
/// `min(base * 2^(attempt-1), max)`.
pub fn capped_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Delay before retry number `attempt`, with jitter of up to half the
/// capped delay when enabled.
pub fn retry_delay(config: &QueueConfig, attempt: u32) -> Duration {
    let delay = capped_delay(config.backoff_base_ms, config.backoff_max_ms, attempt);
    if !config.jitter {
        return delay;
    }
    let spread = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
    delay + Duration::from_millis(fastrand::u64(0..=spread))
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

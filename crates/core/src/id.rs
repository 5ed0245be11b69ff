// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-generated operation identifiers.
//!
//! Format: `op-{hash}` where hash is the first 12 hex chars of
//! SHA256(target_id + created_at + nonce). The id is also the dedup token the
//! remote uses to recognise redelivered operations.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Generate an operation ID from target, creation time and a caller nonce.
pub fn generate_id(target_id: &str, created_at: &DateTime<Utc>, nonce: u64) -> String {
    let input = format!("{}{}{}", target_id, created_at.to_rfc3339(), nonce);
    let hash = Sha256::digest(input.as_bytes());
    format!("op-{}", hex::encode(&hash[..6]))
}

/// Generate a unique ID, handling collisions by appending an incrementing suffix.
pub fn generate_unique_id<F>(
    target_id: &str,
    created_at: &DateTime<Utc>,
    nonce: u64,
    exists: F,
) -> String
where
    F: Fn(&str) -> bool,
{
    let base_id = generate_id(target_id, created_at, nonce);

    if !exists(&base_id) {
        return base_id;
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base_id, suffix);
        if !exists(&id) {
            return id;
        }
        suffix += 1;
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;

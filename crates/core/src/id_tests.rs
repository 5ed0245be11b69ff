// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::collections::HashSet;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

#[test]
fn generate_id_format() {
    let id = generate_id("conv-1", &at(1000), 7);
    assert!(id.starts_with("op-"));
    assert_eq!(id.len(), 3 + 12);
}

#[test]
fn generate_id_is_deterministic() {
    assert_eq!(generate_id("conv-1", &at(1000), 7), generate_id("conv-1", &at(1000), 7));
}

#[test]
fn generate_id_varies_with_nonce() {
    assert_ne!(generate_id("conv-1", &at(1000), 1), generate_id("conv-1", &at(1000), 2));
}

#[test]
fn generate_unique_id_appends_suffix_on_collision() {
    let base = generate_id("conv-1", &at(1000), 7);
    let mut taken = HashSet::new();
    taken.insert(base.clone());
    taken.insert(format!("{}-2", base));

    let id = generate_unique_id("conv-1", &at(1000), 7, |candidate| taken.contains(candidate));
    assert_eq!(id, format!("{}-3", base));
}

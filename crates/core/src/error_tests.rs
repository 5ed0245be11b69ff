// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    validation = { Error::Validation("target is empty".into()), "target is empty" },
    too_large = { Error::PayloadTooLarge { size: 10, max: 4 }, "10 bytes" },
    transient = { Error::TransientNetwork("timeout".into()), "timeout" },
    cancelled = { Error::Cancelled, "cancelled" },
    collection = { Error::InvalidCollection("files".into()), "files" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[parameterized(
    validation = { Error::Validation("x".into()), ErrorKind::Validation },
    too_large = { Error::PayloadTooLarge { size: 10, max: 4 }, ErrorKind::Validation },
    transient = { Error::TransientNetwork("x".into()), ErrorKind::TransientNetwork },
    permanent = { Error::PermanentRemote("x".into()), ErrorKind::PermanentRemote },
    cancelled = { Error::Cancelled, ErrorKind::Cancellation },
    corrupted = { Error::CorruptedState("x".into()), ErrorKind::CorruptedState },
)]
fn error_kind_mapping(err: Error, kind: ErrorKind) {
    assert_eq!(err.kind(), kind);
}

#[test]
fn only_permanent_errors_are_user_visible() {
    assert!(Error::PermanentRemote("rejected".into()).is_user_visible());
    assert!(!Error::TransientNetwork("timeout".into()).is_user_visible());
    assert!(!Error::Cancelled.is_user_visible());
}

#[test]
fn error_from_io_is_corrupted_state() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(err.kind(), ErrorKind::CorruptedState);
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn error_kind_display() {
    assert_eq!(ErrorKind::TransientNetwork.to_string(), "transient_network");
}

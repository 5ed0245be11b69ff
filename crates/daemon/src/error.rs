// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("another daemon instance is already running")]
    AlreadyRunning,

    #[error("daemon is not running (no socket at {})", .0.display())]
    NotRunning(PathBuf),

    #[error(transparent)]
    Core(#[from] courier_core::Error),

    #[error(transparent)]
    Client(#[from] courier_ipc::ClientError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error vocabulary for the scheduling/spawning engine (§7).

use pool_core::PoolError;
use pool_wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("spawn error: {message}")]
    Spawn {
        message: String,
        error_page: Option<String>,
    },

    #[error("busy: {0}")]
    Busy(String),

    #[error("queue full")]
    QueueFull,

    #[error("timeout")]
    Timeout,

    #[error("no such group: {0}")]
    NoSuchGroup(String),

    #[error("no such worker: {0}")]
    NoSuchWorker(String),

    #[error("spawn helper exited: {0}")]
    HelperDied(String),

    #[error("argument error: {0}")]
    Argument(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Wire(_) | EngineError::Timeout)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

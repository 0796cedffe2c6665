// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error vocabulary (§7).
//!
//! Every crate in the workspace maps its own failures onto one of these
//! kinds at the boundary where it talks to another crate or to a peer
//! process, so the RPC layer (§4.6) can always classify a failure into one
//! of the discriminants the wire protocol understands.

use thiserror::Error;

/// The error kinds named in §7, independent of which layer raised them.
#[derive(Debug, Error, Clone)]
pub enum PoolError {
    /// An operating-system call failed.
    #[error("system error: {0}")]
    System(String),

    /// Framing violation, premature EOF, or peer misbehavior.
    #[error("I/O error: {0}")]
    Io(String),

    /// A bounded wait expired.
    #[error("timeout")]
    Timeout,

    /// Authentication failed or rights were insufficient.
    #[error("security error: {0}")]
    Security(String),

    /// The spawn helper could not produce a worker.
    #[error("spawn error: {message}")]
    Spawn {
        message: String,
        /// User-visible HTML page, if the spawn helper supplied one.
        error_page: Option<String>,
    },

    /// The pool is at max and unable to make progress.
    #[error("busy: {0}")]
    Busy(String),

    /// `maxRequestQueueSize` was reached.
    #[error("queue full")]
    QueueFull,

    /// Malformed input at a boundary.
    #[error("argument error: {0}")]
    Argument(String),
}

impl PoolError {
    pub fn is_retryable_connect_failure(&self) -> bool {
        matches!(self, PoolError::Io(_) | PoolError::Timeout)
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The scheduling and process-lifecycle engine behind the application pool:
//! groups, worker handles, the spawn-helper protocol, and the top-level
//! `Pool` dispatcher (§3, §4).

pub mod error;
pub mod group;
pub mod pool;
pub mod session;
pub mod spawn;
pub mod worker;

pub use error::{EngineError, EngineResult};
pub use group::{Group, GroupLimits};
pub use pool::{
    AnalyticsSink, GetOptions, GroupSnapshot, GroupTransaction, MetricsCollector, Pool, PoolLimits,
    PoolSnapshot, ProcessSummary, WorkerSnapshot, MAX_GET_ATTEMPTS,
};
pub use session::{ReleaseNotice, Session, WorkerConnection};
pub use spawn::{HelperConfig, ReloadOptions, SpawnManager, SpawnOptions};
pub use worker::{ProcessMetrics, SocketEndpoint, Transport, WorkerHandle};

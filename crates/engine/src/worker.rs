// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WorkerHandle` bookkeeping for one live worker process (§3).

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Instant;

use pool_core::{AccountUsername, ConnectPassword, DetachKey, GroupName, Gupid, WorkerId};

/// How to reach one of a worker's listening sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Unix,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEndpoint {
    pub address: String,
    pub transport: Transport,
}

/// Process metrics sampled by the metrics collector (§4.5).
#[derive(Debug, Clone, Default)]
pub struct ProcessMetrics {
    pub cpu_percent: f32,
    pub rss_kb: u64,
    pub pss_kb: u64,
    pub private_dirty_kb: u64,
    pub swap_kb: u64,
    pub vm_size_kb: u64,
    pub process_group_id: i32,
    pub command_line: String,
}

/// One live worker process, owned exclusively by its [`Group`](crate::group::Group).
///
/// Per §9's arena+index re-architecture, this struct stores its group by
/// name (`GroupName`), not by pointer: the Pool owns both workers and
/// groups in flat maps keyed by id, breaking the original's handle-to-group
/// back-reference cycle.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub group: GroupName,
    pub pid: i32,
    pub created_at: Instant,
    pub last_used: Instant,
    /// Concurrent sessions currently dispatched to this worker. Invariant: >= 0.
    pub sessions: u32,
    /// Lifetime count of completed requests, used for max-requests retirement.
    pub processed: u64,
    pub sockets: HashMap<String, SocketEndpoint>,
    pub detach_key: DetachKey,
    pub connect_password: ConnectPassword,
    pub gupid: Gupid,
    pub detached: bool,
    pub metrics: Option<ProcessMetrics>,
    /// The ephemeral per-worker account minted for this process by the pool's
    /// `AccountsDatabase` (§3, §4.2), if any. Cleared from the database by
    /// the caller that destroys this handle.
    pub service_account: Option<AccountUsername>,
    /// Write end of the pipe whose closing tells the worker to exit.
    /// Dropping the handle closes it.
    owner_pipe: Option<OwnedFd>,
    /// Socket files this process (not the worker) is responsible for
    /// unlinking on destruction.
    owned_socket_paths: Vec<PathBuf>,
}

pub const MAIN_SOCKET_ROLE: &str = "main";

impl WorkerHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: WorkerId,
        group: GroupName,
        pid: i32,
        sockets: HashMap<String, SocketEndpoint>,
        detach_key: DetachKey,
        connect_password: ConnectPassword,
        gupid: Gupid,
        owner_pipe: OwnedFd,
        owned_socket_paths: Vec<PathBuf>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            group,
            pid,
            created_at: now,
            last_used: now,
            sessions: 0,
            processed: 0,
            sockets,
            detach_key,
            connect_password,
            gupid,
            detached: false,
            metrics: None,
            service_account: None,
            owner_pipe: Some(owner_pipe),
            owned_socket_paths,
        }
    }

    /// The worker's `main` socket. Invariant: always present for a live handle,
    /// but callers still get `Option` back rather than a panic if that's ever
    /// violated by a malformed spawn reply.
    pub fn main_socket(&self) -> Option<&SocketEndpoint> {
        self.sockets.get(MAIN_SOCKET_ROLE)
    }

    pub fn is_idle(&self) -> bool {
        self.sessions == 0
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }

    pub fn set_service_account(&mut self, username: AccountUsername) {
        self.service_account = Some(username);
    }

    /// Overwrite both timestamps with the pool's [`Clock`](pool_core::Clock),
    /// taken right after a successful spawn — `SpawnManager` itself has no
    /// clock of its own, so its `Instant::now()` at construction time would
    /// otherwise bypass the pool's injectable clock entirely (§9).
    pub fn reset_clock(&mut self, now: Instant) {
        self.created_at = now;
        self.last_used = now;
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Dropping `owner_pipe` closes the write end, which is the worker's
        // signal to exit (§3). Any socket files this process allocated for
        // the worker are unlinked best-effort.
        self.owner_pipe = None;
        for path in &self.owned_socket_paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

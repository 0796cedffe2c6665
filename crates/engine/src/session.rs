// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One live request on one worker (§3, §9).
//!
//! A `Session` owns the connected worker socket. Returning it to the pool is
//! an explicit operation (`Session::close`); if a caller simply drops it
//! instead, the drop posts a release message to the pool's release task
//! rather than trying to take the pool mutex itself, per §9's guidance on
//! keeping lock discipline out of destructors.

use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc::UnboundedSender;

use pool_core::{ConnectPassword, DetachKey, GroupName, WorkerId};

use crate::worker::Transport;

/// A message posted to the pool's release task when a session ends,
/// explicitly or via drop.
#[derive(Debug)]
pub struct ReleaseNotice {
    pub worker: WorkerId,
    pub group: GroupName,
}

/// The connected duplex socket to a worker's `main` role.
#[derive(Debug)]
pub enum WorkerConnection {
    Unix(UnixStream),
    Tcp(TcpStream),
}

#[derive(Debug)]
pub struct Session {
    pub worker: WorkerId,
    pub group: GroupName,
    pub socket_role: String,
    pub socket_address: String,
    pub transport: Transport,
    pub detach_key: DetachKey,
    pub connect_password: ConnectPassword,
    initiated: bool,
    connection: Option<WorkerConnection>,
    release_tx: Option<UnboundedSender<ReleaseNotice>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: WorkerId,
        group: GroupName,
        socket_role: String,
        socket_address: String,
        transport: Transport,
        detach_key: DetachKey,
        connect_password: ConnectPassword,
        connection: WorkerConnection,
        release_tx: UnboundedSender<ReleaseNotice>,
    ) -> Self {
        Self {
            worker,
            group,
            socket_role,
            socket_address,
            transport,
            detach_key,
            connect_password,
            initiated: true,
            connection: Some(connection),
            release_tx: Some(release_tx),
        }
    }

    pub fn initiated(&self) -> bool {
        self.initiated
    }

    pub fn connection(&self) -> Option<&WorkerConnection> {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut WorkerConnection> {
        self.connection.as_mut()
    }

    /// Explicitly return this session to the pool. Runs exactly once: the
    /// release channel is taken, so a subsequent drop is a no-op.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(ReleaseNotice {
                worker: self.worker.clone(),
                group: self.group.clone(),
            });
        }
        self.connection = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the one long-running spawn helper subprocess, speaks its line
//! protocol, and restarts it transparently on death (§4.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::net::UnixStream;
use tokio::sync::Mutex as AsyncMutex;

use pool_core::{tokens, GroupName, Gupid, WorkerId};
use pool_wire::{
    read_array_message, read_scalar_message, recv_fd, write_array_message, write_scalar_message,
    TimeoutBudget,
};

use crate::error::{EngineError, EngineResult};
use crate::worker::{SocketEndpoint, Transport, WorkerHandle};

use super::helper::{self, HelperConfig, HelperProcess};
use super::options::SpawnOptions;

/// Serializes `spawn`/`reload` against the one helper instance, and owns
/// that instance across restarts.
pub struct SpawnManager {
    config: HelperConfig,
    generation: AtomicU64,
    helper: AsyncMutex<Option<HelperProcess>>,
}

impl SpawnManager {
    pub fn new(config: HelperConfig) -> Self {
        Self {
            config,
            generation: AtomicU64::new(0),
            helper: AsyncMutex::new(None),
        }
    }

    pub async fn server_pid(&self) -> Option<u32> {
        self.helper.lock().await.as_ref().map(|h| h.pid)
    }

    /// Test hook: kill the current helper out from under the manager so the
    /// next `spawn`/`reload` observes it dead and restarts it.
    pub async fn kill_spawn_server(&self) -> EngineResult<()> {
        let mut guard = self.helper.lock().await;
        if let Some(helper) = guard.take() {
            helper::terminate(helper).await?;
        }
        Ok(())
    }

    async fn ensure_helper<'a>(
        &self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<HelperProcess>>,
    ) -> EngineResult<()> {
        if guard.is_none() {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst);
            **guard = Some(self.config.launch(generation).await?);
        }
        Ok(())
    }

    async fn restart_helper<'a>(
        &self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<HelperProcess>>,
    ) -> EngineResult<()> {
        if let Some(old) = guard.take() {
            let _ = helper::terminate(old).await;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        **guard = Some(self.config.launch(generation).await?);
        Ok(())
    }

    /// §4.3: connect, authenticate, write `spawn_application`, read the
    /// status/info/socket-list/fd sequence. Restarts the helper and retries
    /// exactly once on I/O failure.
    pub async fn spawn(&self, group: &GroupName, options: &SpawnOptions) -> EngineResult<WorkerHandle> {
        let mut guard = self.helper.lock().await;
        self.ensure_helper(&mut guard).await?;

        match self.try_spawn(guard.as_ref(), group, options).await {
            Ok(handle) => Ok(handle),
            Err(_first_err) => {
                self.restart_helper(&mut guard).await?;
                self.try_spawn(guard.as_ref(), group, options).await
            }
        }
    }

    /// §4.3: connect, write `["reload", groupName]`. Same restart-on-failure
    /// policy as `spawn`.
    pub async fn reload(&self, group: &GroupName) -> EngineResult<()> {
        let mut guard = self.helper.lock().await;
        self.ensure_helper(&mut guard).await?;

        match self.try_reload(guard.as_ref(), group).await {
            Ok(()) => Ok(()),
            Err(_first_err) => {
                self.restart_helper(&mut guard).await?;
                self.try_reload(guard.as_ref(), group).await
            }
        }
    }

    async fn connect_and_authenticate(
        &self,
        helper: Option<&HelperProcess>,
    ) -> EngineResult<UnixStream> {
        let helper = helper.ok_or_else(|| EngineError::HelperDied("no helper running".into()))?;
        let mut stream = UnixStream::connect(&helper.socket_path)
            .await
            .map_err(|e| EngineError::Wire(e.into()))?;
        write_scalar_message(&mut stream, helper.password.as_bytes())
            .await
            .map_err(EngineError::Wire)?;
        Ok(stream)
    }

    async fn try_reload(&self, helper: Option<&HelperProcess>, group: &GroupName) -> EngineResult<()> {
        let mut stream = self.connect_and_authenticate(helper).await?;
        write_array_message(&mut stream, &[b"reload", group.as_str().as_bytes()])
            .await
            .map_err(EngineError::Wire)?;
        Ok(())
    }

    async fn try_spawn(
        &self,
        helper: Option<&HelperProcess>,
        group: &GroupName,
        options: &SpawnOptions,
    ) -> EngineResult<WorkerHandle> {
        let mut stream = self.connect_and_authenticate(helper).await?;
        let mut budget = TimeoutBudget::unlimited();

        let detach_key = tokens::generate_detach_key();
        let connect_password = tokens::generate_connect_password();

        let mut elements: Vec<Vec<u8>> = vec![b"spawn_application".to_vec()];
        elements.push(b"app_root".to_vec());
        elements.push(options.app_root.as_bytes().to_vec());
        for (key, value) in &options.extra {
            elements.push(key.as_bytes().to_vec());
            elements.push(value.as_bytes().to_vec());
        }
        elements.push(b"detach_key".to_vec());
        elements.push(detach_key.0.as_bytes().to_vec());
        elements.push(b"connect_password".to_vec());
        elements.push(connect_password.0.as_bytes().to_vec());
        if let Some(username) = &options.pool_account_username {
            elements.push(b"pool_account_username".to_vec());
            elements.push(username.as_bytes().to_vec());
        }
        if let Some(password) = &options.pool_account_password_base64 {
            elements.push(b"pool_account_password_base64".to_vec());
            elements.push(password.as_bytes().to_vec());
        }
        let refs: Vec<&[u8]> = elements.iter().map(Vec::as_slice).collect();
        write_array_message(&mut stream, &refs)
            .await
            .map_err(EngineError::Wire)?;

        let status = read_array_message(&mut stream, &mut budget)
            .await
            .map_err(EngineError::Wire)?;
        match status.first().map(Vec::as_slice) {
            Some(b"ok") => {}
            Some(b"error_page") => {
                let page = read_scalar_message(&mut stream, 16 * 1024 * 1024, &mut budget)
                    .await
                    .map_err(EngineError::Wire)?;
                return Err(EngineError::Spawn {
                    message: "spawn helper reported an error page".into(),
                    error_page: Some(String::from_utf8_lossy(&page).into_owned()),
                });
            }
            _ => {
                return Err(EngineError::Spawn {
                    message: "spawn helper reported generic failure".into(),
                    error_page: None,
                });
            }
        }

        let info = read_array_message(&mut stream, &mut budget)
            .await
            .map_err(EngineError::Wire)?;
        let pid: i32 = info
            .get(1)
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| EngineError::Spawn {
                message: "malformed spawn info reply (pid)".into(),
                error_page: None,
            })?;
        let n_sockets: usize = info
            .get(2)
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| EngineError::Spawn {
                message: "malformed spawn info reply (socket count)".into(),
                error_page: None,
            })?;

        let mut sockets = std::collections::HashMap::new();
        for _ in 0..n_sockets {
            let socket_msg = read_array_message(&mut stream, &mut budget)
                .await
                .map_err(EngineError::Wire)?;
            let role = socket_msg
                .first()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let address = socket_msg
                .get(1)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let transport = match socket_msg.get(2).map(Vec::as_slice) {
                Some(b"tcp") => Transport::Tcp,
                _ => Transport::Unix,
            };
            sockets.insert(role, SocketEndpoint { address, transport });
        }
        if !sockets.contains_key(crate::worker::MAIN_SOCKET_ROLE) {
            return Err(EngineError::Spawn {
                message: "spawn helper did not report a \"main\" socket".into(),
                error_page: None,
            });
        }

        let owner_pipe = recv_fd(&mut stream, &mut budget)
            .await
            .map_err(EngineError::Wire)?;

        Ok(WorkerHandle::new(
            WorkerId::new(uuid::Uuid::new_v4().to_string()),
            group.clone(),
            pid,
            sockets,
            detach_key,
            connect_password,
            Gupid(uuid::Uuid::new_v4().to_string()),
            owner_pipe,
            Vec::new(),
            Instant::now(),
        ))
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

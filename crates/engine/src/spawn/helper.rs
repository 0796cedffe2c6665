// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launching and tearing down the spawn helper subprocess (§4.3, §6).
//!
//! The helper itself — the program that actually forks and execs
//! application code — is an external collaborator named only by its
//! interface; this module only owns the lifecycle of *a* process that
//! speaks that interface over a Unix-domain socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{EngineError, EngineResult};

/// A running helper instance: its process handle plus the credentials a
/// caller needs to talk to it.
pub struct HelperProcess {
    pub(crate) child: Child,
    pub pid: u32,
    pub socket_path: PathBuf,
    pub password: String,
}

impl HelperProcess {
    pub fn pid_signed(&self) -> Pid {
        Pid::from_raw(self.pid as i32)
    }
}

/// How to launch a fresh helper instance.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Path to the helper executable. Out of scope for this crate to
    /// implement; tests point this at a double that speaks the protocol.
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Directory the per-instance socket is created in. Must already have
    /// tight permissions (`0700`); the manager does not relax them.
    pub runtime_dir: PathBuf,
}

impl HelperConfig {
    pub async fn launch(&self, generation: u64) -> EngineResult<HelperProcess> {
        let socket_path = self
            .runtime_dir
            .join(format!("spawn-helper-{generation}.sock"));
        let password = pool_core::tokens::generate_helper_password();

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env("SPAWN_HELPER_SOCKET", &socket_path)
            .env("SPAWN_HELPER_PASSWORD", &password)
            .env("SPAWN_HELPER_RUNTIME_DIR", &self.runtime_dir)
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| EngineError::HelperDied(format!("failed to launch helper: {e}")))?;
        let pid = child
            .id()
            .ok_or_else(|| EngineError::HelperDied("helper exited before reporting a pid".into()))?;

        Ok(HelperProcess {
            child,
            pid,
            socket_path,
            password,
        })
    }
}

/// SIGTERM, wait up to 5s, then SIGKILL and wait 5 more (§4.3).
pub async fn terminate(mut helper: HelperProcess) -> EngineResult<()> {
    let _ = signal::kill(helper.pid_signed(), Signal::SIGTERM);
    if timeout(Duration::from_secs(5), helper.child.wait())
        .await
        .is_ok()
    {
        return Ok(());
    }

    let _ = signal::kill(helper.pid_signed(), Signal::SIGKILL);
    match timeout(Duration::from_secs(5), helper.child.wait()).await {
        Ok(_) => Ok(()),
        Err(_) => Err(EngineError::HelperDied(
            "helper did not exit after SIGKILL".into(),
        )),
    }
}

pub fn socket_dir_is_private(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777 == 0o700)
        .unwrap_or(false)
}

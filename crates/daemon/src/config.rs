// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration and the on-disk server-instance layout (§6).

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Generation-numbered layout under the server instance directory (§6):
///
/// ```text
/// <server_instance_dir>/
///   generation-0/
///     core.sock                     (the RPC Unix socket)
///     core.pid                      (lock/pid file)
///     passenger-status-password.txt (mode 0400)
///     spawn-server/                 (spawn-helper tempfiles/sockets)
///     info/status.fifo              (only if enable_status_fifo)
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub server_instance_dir: PathBuf,
    pub generation_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub status_password_path: PathBuf,
    pub spawn_server_dir: PathBuf,
    pub status_fifo_path: PathBuf,
    pub log_path: PathBuf,
    /// §9: "treat the status FIFO as optional" — defaults to disabled.
    pub enable_status_fifo: bool,
    pub max_idle_time_secs: u64,
    pub max_pool_size: usize,
    pub max_per_app: usize,
}

const GENERATION: &str = "generation-0";

impl Config {
    /// Load configuration for this daemon instance.
    ///
    /// Reads `PASSENGER_TEMP_DIR` or `PASSENGER_TMPDIR` (§6) for the base
    /// temp directory under which the server instance directory is
    /// created, falling back to the process's own temp directory.
    pub fn load() -> Result<Self, LifecycleError> {
        let base = temp_dir_from_env();
        let server_instance_dir = base.join(format!("passenger.{}", std::process::id()));
        let generation_dir = server_instance_dir.join(GENERATION);

        let enable_status_fifo = std::env::var("POOL_ENABLE_STATUS_FIFO")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            socket_path: generation_dir.join("core.sock"),
            lock_path: generation_dir.join("core.pid"),
            status_password_path: generation_dir.join("passenger-status-password.txt"),
            spawn_server_dir: generation_dir.join("spawn-server"),
            status_fifo_path: generation_dir.join("info").join("status.fifo"),
            log_path: generation_dir.join("core.log"),
            enable_status_fifo,
            max_idle_time_secs: 300,
            max_pool_size: 6,
            max_per_app: 0,
            server_instance_dir,
            generation_dir,
        })
    }
}

fn temp_dir_from_env() -> PathBuf {
    std::env::var_os("PASSENGER_TEMP_DIR")
        .or_else(|| std::env::var_os("PASSENGER_TMPDIR"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

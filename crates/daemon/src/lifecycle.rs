// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown (§6).

use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use pool_core::AccountsDatabase;
use pool_engine::{HelperConfig, Pool, PoolLimits, SpawnManager};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock at {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state held for the lifetime of the process.
pub struct DaemonState {
    pub config: Config,
    pub pool: Arc<Pool>,
    pub accounts: Arc<AccountsDatabase>,
    pub listener: UnixListener,
    // Held to keep the exclusive lock for the process lifetime; released on drop.
    #[allow(dead_code)]
    lock_file: File,
}

/// Clean up the on-disk generation directory. Takes `&Config` rather than
/// `&DaemonState` so callers can shut down after moving the listener/pool
/// out of the state to spawn them as tasks.
pub fn shutdown(config: &Config) {
    info!("shutting down");

    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!(error = %e, "failed to remove socket file");
        }
    }
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!(error = %e, "failed to remove lock file");
        }
    }
    if config.status_password_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.status_password_path) {
            warn!(error = %e, "failed to remove status password file");
        }
    }

    info!("shutdown complete");
}

/// Start the daemon: acquire the lock, lay out the generation directory,
/// bind the RPC socket, and build the `Pool` (§6).
pub async fn startup(config: Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(&config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            // A lock failure means another daemon owns these files; leave
            // them alone. Any other failure means we own a half-built
            // generation directory and should clean it up.
            if !matches!(e, LifecycleError::LockFailed(_, _)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.generation_dir)?;
    std::fs::create_dir_all(&config.spawn_server_dir)?;
    if config.enable_status_fifo {
        if let Some(parent) = config.status_fifo_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Acquire the lock before truncating it, so a failed attempt never
    // clobbers the PID of an already-running daemon.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(config.lock_path.clone(), e))?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let accounts = Arc::new(AccountsDatabase::new());

    let spawn_manager = Arc::new(SpawnManager::new(HelperConfig {
        command: PathBuf::from("passenger-spawn-helper"),
        args: Vec::new(),
        runtime_dir: config.spawn_server_dir.clone(),
    }));

    let limits = PoolLimits {
        max: config.max_pool_size,
        max_per_app: config.max_per_app,
        max_idle_time: std::time::Duration::from_secs(config.max_idle_time_secs),
        max_request_queue_size: 0,
    };
    let pool = Pool::new(limits, spawn_manager, Arc::clone(&accounts), pool_core::SystemClock);
    pool.spawn_idle_reaper();

    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    // §6: mode 0400, owner-readable only.
    write_status_password(config, &accounts)?;

    Ok(DaemonState {
        config: config.clone(),
        pool,
        accounts,
        listener,
        lock_file,
    })
}

fn write_status_password(
    config: &Config,
    accounts: &AccountsDatabase,
) -> Result<(), LifecycleError> {
    use pool_core::{Secret, Rights};

    let password = pool_core::tokens::generate_helper_password();
    std::fs::write(&config.status_password_path, &password)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            &config.status_password_path,
            std::fs::Permissions::from_mode(0o400),
        )?;
    }

    accounts.add(
        "_status",
        Secret::Cleartext(password),
        Rights::INSPECT_BASIC_INFO | Rights::INSPECT_SENSITIVE_INFO,
    );
    Ok(())
}

fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(&config.socket_path);
    let _ = std::fs::remove_dir_all(&config.server_instance_dir);
}

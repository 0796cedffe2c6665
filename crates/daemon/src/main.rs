// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool daemon (poold)
//!
//! The long-running process that owns the `Pool` and speaks the RPC
//! Server protocol over a Unix socket (§4.6). Spawned and supervised by
//! `poolctl`; not meant to be run interactively.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use pool_daemon::config::Config;
use pool_daemon::lifecycle::{self, LifecycleError};
use pool_daemon::listener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("poold {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("poold {}", env!("CARGO_PKG_VERSION"));
                println!("Application pool daemon - owns worker processes and answers");
                println!("the RPC Server protocol over a Unix socket.");
                println!();
                println!("USAGE:");
                println!("    poold");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: poold [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    let _log_guard = setup_logging(&config)?;

    info!(socket = %config.socket_path.display(), "starting pool daemon");

    let state = lifecycle::startup(config).await?;
    let shutdown_config = state.config.clone();
    info!(pid = std::process::id(), "pool daemon ready");

    let listener_task = tokio::spawn(listener::run(
        state.listener,
        state.pool,
        state.accounts,
    ));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
        result = listener_task => {
            if let Err(e) = result {
                info!(error = %e, "listener task ended");
            }
        }
    }

    lifecycle::shutdown(&shutdown_config);
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let log_dir = config.log_path.parent().unwrap_or(std::path::Path::new("."));
    let log_file = config
        .log_path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("core.log"));
    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

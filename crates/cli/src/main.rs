// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! poolctl - administrative client for the pool daemon's RPC Server (§4.6).

mod client;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use pool_daemon::protocol::{Request, Response};

use crate::client::Client;

#[derive(Parser)]
#[command(name = "poolctl", version, about = "Administer a running pool daemon")]
struct Cli {
    /// Path to the daemon's RPC Unix socket.
    #[arg(long, env = "POOLCTL_SOCKET")]
    socket: PathBuf,

    /// Account username to authenticate as.
    #[arg(long, env = "POOLCTL_USERNAME", default_value = "_status")]
    username: String,

    /// Account password (normally read from `passenger-status-password.txt`).
    #[arg(long, env = "POOLCTL_PASSWORD")]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a session for an application root.
    Get {
        app_root: String,
        #[arg(long)]
        use_global_queue: bool,
    },
    /// Release all workers and groups immediately.
    Clear,
    /// Detach the worker owning the given detach key.
    Detach { detach_key: String },
    /// Set the idle timeout, in seconds.
    SetMaxIdleTime { seconds: u64 },
    /// Set the pool-wide worker limit.
    SetMax { n: usize },
    /// Set the per-application worker limit (0 disables).
    SetMaxPerApp { n: usize },
    /// Print the number of currently active workers.
    GetActive,
    /// Print the total number of live workers.
    GetCount,
    /// Print the number of requests waiting on the global queue.
    GetGlobalQueueSize,
    /// Print a human-readable pool snapshot.
    Inspect,
    /// Print an XML pool snapshot.
    ToXml {
        #[arg(long)]
        sensitive: bool,
    },
    /// Ask the daemon to exit.
    Exit {
        #[arg(long)]
        immediately: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = Client::connect(&cli.socket, &cli.username, &cli.password)
        .await
        .with_context(|| format!("connecting to {}", cli.socket.display()))?;

    let request = match cli.command {
        Command::Get {
            app_root,
            use_global_queue,
        } => {
            let response = client
                .call(&Request::Get(pool_daemon::protocol::GetOptionsWire {
                    app_root,
                    use_global_queue,
                    extra: Default::default(),
                }))
                .await?;
            return report_get(response, &mut client).await;
        }
        Command::Clear => Request::Clear,
        Command::Detach { detach_key } => Request::Detach { detach_key },
        Command::SetMaxIdleTime { seconds } => Request::SetMaxIdleTime { seconds },
        Command::SetMax { n } => Request::SetMax { n },
        Command::SetMaxPerApp { n } => Request::SetMaxPerApp { n },
        Command::GetActive => Request::GetActive,
        Command::GetCount => Request::GetCount,
        Command::GetGlobalQueueSize => Request::GetGlobalQueueSize,
        Command::Inspect => Request::Inspect,
        Command::ToXml { sensitive } => Request::ToXml {
            include_sensitive: sensitive,
        },
        Command::Exit { immediately } => Request::Exit { immediately },
    };

    let response = client.call(&request).await?;
    print_response(response)
}

async fn report_get(response: Response, client: &mut Client) -> Result<()> {
    match response {
        Response::Ok { pid, session_id } => {
            let _fd = client
                .receive_fd()
                .await
                .context("receiving worker socket descriptor")?;
            println!("session {session_id} on pid {pid}");
            Ok(())
        }
        other => print_response(other),
    }
}

fn print_response(response: Response) -> Result<()> {
    match response {
        Response::Ok { pid, session_id } => {
            println!("session {session_id} on pid {pid}");
            Ok(())
        }
        Response::SpawnException {
            message,
            has_error_page,
        } => Err(anyhow!(
            "spawn failed: {message}{}",
            if has_error_page { " (error page available)" } else { "" }
        )),
        Response::BusyException(msg) => Err(anyhow!("busy: {msg}")),
        Response::IoException(msg) => Err(anyhow!("I/O error: {msg}")),
        Response::SecurityException(msg) => Err(anyhow!("not authorized: {msg}")),
        Response::True => {
            println!("true");
            Ok(())
        }
        Response::False => {
            println!("false");
            Ok(())
        }
        Response::Count(n) => {
            println!("{n}");
            Ok(())
        }
        Response::Text(s) => {
            println!("{s}");
            Ok(())
        }
        Response::PassedSecurity | Response::ExitCommandReceived | Response::Empty => {
            println!("ok");
            Ok(())
        }
    }
}

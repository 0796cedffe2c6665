// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC Server's accept loop and per-connection command dispatch (§4.6).

use std::collections::HashMap;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{info, warn};

use pool_core::{AccountsDatabase, DetachKey, Rights};
use pool_engine::{GetOptions, Pool, Session};
use pool_wire::{read_array_message, read_scalar_message, write_array_message, TimeoutBudget};

use crate::protocol::{Request, Response};

const MAX_PASSWORD_LEN: usize = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Accept connections on `listener` until the process is told to stop.
pub async fn run(
    listener: tokio::net::UnixListener,
    pool: Arc<Pool>,
    accounts: Arc<AccountsDatabase>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let pool = Arc::clone(&pool);
                let accounts = Arc::clone(&accounts);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, pool, accounts).await {
                        warn!(error = %e, "connection ended with an error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    pool: Arc<Pool>,
    accounts: Arc<AccountsDatabase>,
) -> Result<(), pool_wire::WireError> {
    let mut budget = TimeoutBudget::of(REQUEST_TIMEOUT);

    let username_bytes = read_scalar_message(&mut stream, MAX_PASSWORD_LEN, &mut budget).await?;
    let password_bytes = read_scalar_message(&mut stream, MAX_PASSWORD_LEN, &mut budget).await?;
    let username = String::from_utf8_lossy(&username_bytes).into_owned();
    let password = String::from_utf8_lossy(&password_bytes).into_owned();

    let account = match accounts.authenticate(&username, &password) {
        Some(account) => account,
        None => {
            write_array_message(
                &mut stream,
                &Response::SecurityException("invalid credentials".into())
                    .encode()
                    .iter()
                    .map(Vec::as_slice)
                    .collect::<Vec<_>>(),
            )
            .await?;
            return Ok(());
        }
    };
    write_array_message(
        &mut stream,
        &Response::PassedSecurity
            .encode()
            .iter()
            .map(Vec::as_slice)
            .collect::<Vec<_>>(),
    )
    .await?;

    let mut sessions: HashMap<u32, Session> = HashMap::new();
    let mut next_session_id: u32 = 1;

    loop {
        let mut budget = TimeoutBudget::unlimited();
        let elements = match read_array_message(&mut stream, &mut budget).await {
            Ok(e) if !e.is_empty() => e,
            _ => break,
        };

        let request = match Request::decode(&elements) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed request");
                break;
            }
        };

        if matches!(request, Request::Exit { .. }) && !account.has_rights(Rights::EXIT) {
            send(&mut stream, Response::SecurityException("not authorized".into())).await?;
            break;
        }

        match request {
            Request::Get(opts) => {
                if !account.has_rights(Rights::GET) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                let mut get_options = GetOptions::new(opts.app_root);
                get_options.use_global_queue = opts.use_global_queue;
                get_options.extra = opts.extra;
                match pool.get(get_options).await {
                    Ok(session) => {
                        let session_id = next_session_id;
                        next_session_id += 1;
                        let pid = pool.worker_pid(&session.worker).unwrap_or(0);
                        send(&mut stream, Response::Ok { pid, session_id }).await?;
                        send_session_fd(&mut stream, &session).await?;
                        sessions.insert(session_id, session);
                    }
                    Err(e) => {
                        send_engine_error(&mut stream, &e).await?;
                    }
                }
            }
            Request::Close { session_id } => {
                if let Some(session) = sessions.remove(&session_id) {
                    session.close();
                }
            }
            Request::Clear => {
                if !account.has_rights(Rights::CLEAR) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                pool.clear();
                send(&mut stream, Response::Empty).await?;
            }
            Request::Detach { detach_key } => {
                if !account.has_rights(Rights::DETACH) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                let ok = pool.detach(&DetachKey(detach_key));
                send(&mut stream, if ok { Response::True } else { Response::False }).await?;
            }
            Request::SetMaxIdleTime { seconds } => {
                require_and_run(&mut stream, &account, Rights::SET_PARAMETERS, || {
                    pool.set_max_idle_time(seconds)
                })
                .await?;
            }
            Request::SetMax { n } => {
                require_and_run(&mut stream, &account, Rights::SET_PARAMETERS, || {
                    pool.set_max(n)
                })
                .await?;
            }
            Request::SetMaxPerApp { n } => {
                require_and_run(&mut stream, &account, Rights::SET_PARAMETERS, || {
                    pool.set_max_per_app(n)
                })
                .await?;
            }
            Request::GetActive => {
                if !account.has_rights(Rights::GET_PARAMETERS) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                send(&mut stream, Response::Count(pool.get_active() as u64)).await?;
            }
            Request::GetCount => {
                if !account.has_rights(Rights::GET_PARAMETERS) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                send(&mut stream, Response::Count(pool.get_count() as u64)).await?;
            }
            Request::GetGlobalQueueSize => {
                if !account.has_rights(Rights::GET_PARAMETERS) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                send(
                    &mut stream,
                    Response::Count(pool.get_global_queue_size() as u64),
                )
                .await?;
            }
            Request::Inspect => {
                if !account.has_rights(Rights::INSPECT_BASIC_INFO) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                let snapshot = pool.inspect();
                send(&mut stream, Response::Text(format!("{snapshot:?}"))).await?;
            }
            Request::ToXml { include_sensitive } => {
                if !account.has_rights(Rights::INSPECT_BASIC_INFO) {
                    send(&mut stream, Response::SecurityException("not authorized".into())).await?;
                    break;
                }
                let sensitive =
                    include_sensitive && account.has_rights(Rights::INSPECT_SENSITIVE_INFO);
                let xml = pool.to_xml(sensitive);
                send(&mut stream, Response::Text(xml)).await?;
            }
            Request::Exit { .. } => {
                send(&mut stream, Response::ExitCommandReceived).await?;
                info!("exit command received over RPC connection");
                break;
            }
        }
    }

    Ok(())
}

async fn require_and_run(
    stream: &mut UnixStream,
    account: &pool_core::Account,
    right: Rights,
    f: impl FnOnce(),
) -> Result<(), pool_wire::WireError> {
    if !account.has_rights(right) {
        send(stream, Response::SecurityException("not authorized".into())).await?;
        return Ok(());
    }
    f();
    send(stream, Response::Empty).await
}

async fn send(stream: &mut UnixStream, response: Response) -> Result<(), pool_wire::WireError> {
    let elements = response.encode();
    write_array_message(
        stream,
        &elements.iter().map(Vec::as_slice).collect::<Vec<_>>(),
    )
    .await
}

async fn send_session_fd(
    stream: &mut UnixStream,
    session: &Session,
) -> Result<(), pool_wire::WireError> {
    let mut budget = TimeoutBudget::of(REQUEST_TIMEOUT);
    match session.connection() {
        Some(pool_engine::WorkerConnection::Unix(worker_stream)) => {
            pool_wire::send_fd(stream, worker_stream.as_fd(), &mut budget).await
        }
        Some(pool_engine::WorkerConnection::Tcp(worker_stream)) => {
            pool_wire::send_fd(stream, worker_stream.as_fd(), &mut budget).await
        }
        None => Ok(()),
    }
}

/// Send a `get` failure's array reply and, for a `SpawnException` carrying
/// an error page, the follow-up scalar message §4.6 requires (a conformant
/// peer that sees `has_error_page=1` otherwise blocks forever).
async fn send_engine_error(
    stream: &mut UnixStream,
    err: &pool_engine::EngineError,
) -> Result<(), pool_wire::WireError> {
    use pool_engine::EngineError;
    let (response, error_page) = match err {
        EngineError::Busy(msg) => (Response::BusyException(msg.clone()), None),
        EngineError::QueueFull => (Response::BusyException("queue full".into()), None),
        EngineError::Spawn { message, error_page } => (
            Response::SpawnException {
                message: message.clone(),
                has_error_page: error_page.is_some(),
            },
            error_page.clone(),
        ),
        other => (Response::IoException(other.to_string()), None),
    };
    send(stream, response).await?;
    if let Some(page) = error_page {
        pool_wire::write_scalar_message(stream, page.as_bytes()).await?;
    }
    Ok(())
}

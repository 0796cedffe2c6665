// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin client for the Pool RPC Server protocol (§4.6).

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UnixStream;

use pool_daemon::protocol::{Request, Response};
use pool_wire::{read_array_message, read_scalar_message, write_scalar_message, TimeoutBudget, WireError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_PAGE_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {0}: {1}")]
    Connect(String, std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),
}

pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(
        socket_path: &Path,
        username: &str,
        password: &str,
    ) -> Result<Self, ClientError> {
        let mut stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Connect(socket_path.display().to_string(), e))?;

        write_scalar_message(&mut stream, username.as_bytes()).await?;
        write_scalar_message(&mut stream, password.as_bytes()).await?;

        let mut budget = TimeoutBudget::of(DEFAULT_TIMEOUT);
        let elements = read_array_message(&mut stream, &mut budget).await?;
        match Response::decode(&elements)? {
            Response::PassedSecurity => Ok(Self { stream }),
            Response::SecurityException(msg) => Err(ClientError::AuthRejected(msg)),
            _ => Err(ClientError::AuthRejected("unexpected handshake reply".into())),
        }
    }

    /// Send one request and read its array-message reply. Does not perform
    /// the `get` command's fd-passing handshake; callers that issue `get`
    /// should follow up with [`Client::receive_fd`] separately.
    ///
    /// A `SpawnException` whose `has_error_page` flag is set is followed by
    /// a scalar message carrying the captured HTML error page (§4.6); that
    /// scalar is read here and folded into the returned `message` so it
    /// isn't left on the wire for the next call to trip over.
    pub async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let elements = request.encode();
        pool_wire::write_array_message(
            &mut self.stream,
            &elements.iter().map(Vec::as_slice).collect::<Vec<_>>(),
        )
        .await?;

        let mut budget = TimeoutBudget::of(DEFAULT_TIMEOUT);
        let elements = read_array_message(&mut self.stream, &mut budget).await?;
        if elements.is_empty() {
            return Ok(Response::Empty);
        }
        let response = Response::decode(&elements)?;
        if let Response::SpawnException {
            message,
            has_error_page: true,
        } = response
        {
            let page = read_scalar_message(&mut self.stream, MAX_ERROR_PAGE_LEN, &mut budget).await?;
            return Ok(Response::SpawnException {
                message: format!("{message}\n\n{}", String::from_utf8_lossy(&page)),
                has_error_page: true,
            });
        }
        Ok(response)
    }

    /// Receive the worker socket fd that follows a successful `get` reply
    /// (§4.1's "pass IO" handshake).
    pub async fn receive_fd(&mut self) -> Result<std::os::fd::OwnedFd, ClientError> {
        let mut budget = TimeoutBudget::of(DEFAULT_TIMEOUT);
        Ok(pool_wire::recv_fd(&mut self.stream, &mut budget).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    /// §4.6: a `SpawnException` with `has_error_page` set must be followed
    /// by a scalar message carrying the error page, and `Client::call` must
    /// read it rather than leaving it on the wire for the next call to trip
    /// over.
    #[tokio::test]
    async fn call_reads_the_error_page_scalar_following_a_spawn_exception() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("fake-pool.sock");
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut budget = TimeoutBudget::unlimited();

            let _username = read_scalar_message(&mut stream, 4096, &mut budget).await.unwrap();
            let _password = read_scalar_message(&mut stream, 4096, &mut budget).await.unwrap();
            let elements = Response::PassedSecurity.encode();
            pool_wire::write_array_message(
                &mut stream,
                &elements.iter().map(Vec::as_slice).collect::<Vec<_>>(),
            )
            .await
            .unwrap();

            let _request = read_array_message(&mut stream, &mut budget).await.unwrap();
            let elements = Response::SpawnException {
                message: "spawn helper reported an error page".to_string(),
                has_error_page: true,
            }
            .encode();
            pool_wire::write_array_message(
                &mut stream,
                &elements.iter().map(Vec::as_slice).collect::<Vec<_>>(),
            )
            .await
            .unwrap();
            write_scalar_message(&mut stream, b"<html>boom</html>")
                .await
                .unwrap();
            stream.flush().await.unwrap();
        });

        let mut client = Client::connect(&socket_path, "admin", "s3cret")
            .await
            .unwrap();

        let response = client.call(&Request::GetCount).await.unwrap();
        match response {
            Response::SpawnException { message, has_error_page } => {
                assert!(has_error_page);
                assert!(message.contains("<html>boom</html>"));
            }
            other => panic!("expected SpawnException, got {other:?}"),
        }

        server.await.unwrap();
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pool_wire::{read_scalar_message, send_fd, write_array_message};
use std::os::fd::AsFd;
use tokio::net::{UnixListener, UnixStream as TokioUnixStream};
use tokio::process::Command;

/// Plays the helper side of one `spawn_application` exchange over an
/// already-accepted connection, then returns.
async fn serve_one_spawn(mut stream: TokioUnixStream, expected_password: &str) {
    let mut budget = TimeoutBudget::unlimited();
    let password = read_scalar_message(&mut stream, 1024, &mut budget)
        .await
        .unwrap();
    assert_eq!(password, expected_password.as_bytes());

    let request = read_array_message(&mut stream, &mut budget).await.unwrap();
    assert_eq!(request.first().unwrap(), b"spawn_application");
    assert_eq!(request.get(1).unwrap(), b"app_root");
    assert_eq!(request.get(2).unwrap(), b"/srv/app");

    write_array_message(&mut stream, &[b"ok"]).await.unwrap();
    write_array_message(&mut stream, &[b"/srv/app", b"4242", b"1"])
        .await
        .unwrap();
    write_array_message(&mut stream, &[b"main", b"/tmp/worker.sock", b"unix"])
        .await
        .unwrap();

    let owner_pipe = tempfile::tempfile().unwrap();
    send_fd(&mut stream, owner_pipe.as_fd(), &mut budget)
        .await
        .unwrap();
}

#[tokio::test]
async fn try_spawn_parses_a_well_formed_helper_reply() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fake-helper.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let password = "test-password".to_string();
    let server_password = password.clone();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_one_spawn(stream, &server_password).await;
    });

    // A harmless real process stands in for the helper's OS process handle;
    // the actual protocol exchange happens over the listener above, not
    // through anything this child does.
    let child = Command::new("sleep")
        .arg("5")
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();
    let fake_helper = HelperProcess {
        child,
        pid,
        socket_path,
        password,
    };

    let manager = SpawnManager::new(HelperConfig {
        command: "/bin/true".into(),
        args: vec![],
        runtime_dir: dir.path().to_path_buf(),
    });

    let options = SpawnOptions::new("/srv/app");
    let handle = manager
        .try_spawn(Some(&fake_helper), &GroupName::new("/srv/app"), &options)
        .await
        .unwrap();

    assert_eq!(handle.pid, 4242);
    assert!(handle.main_socket().is_some());
    assert_eq!(
        handle.main_socket().unwrap().address,
        "/tmp/worker.sock"
    );

    server.await.unwrap();
}

/// §3/§4.2: when a caller populates `pool_account_username`/
/// `pool_account_password_base64`, `try_spawn` must forward both onto the
/// `spawn_application` wire message so the spawned process can authenticate
/// back to the pool.
#[tokio::test]
async fn try_spawn_forwards_the_pool_account_fields_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fake-helper.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let password = "test-password".to_string();
    let server_password = password.clone();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut budget = TimeoutBudget::unlimited();
        let pw = read_scalar_message(&mut stream, 1024, &mut budget).await.unwrap();
        assert_eq!(pw, server_password.as_bytes());

        let request = read_array_message(&mut stream, &mut budget).await.unwrap();
        let pairs: Vec<&[u8]> = request.iter().map(Vec::as_slice).collect();
        assert!(pairs.windows(2).any(|w| w == [b"pool_account_username".as_slice(), b"svc-1".as_slice()]));
        assert!(pairs
            .windows(2)
            .any(|w| w == [b"pool_account_password_base64".as_slice(), b"secretpw".as_slice()]));

        write_array_message(&mut stream, &[b"ok"]).await.unwrap();
        write_array_message(&mut stream, &[b"/srv/app", b"4242", b"1"])
            .await
            .unwrap();
        write_array_message(&mut stream, &[b"main", b"/tmp/worker.sock", b"unix"])
            .await
            .unwrap();
        let owner_pipe = tempfile::tempfile().unwrap();
        send_fd(&mut stream, owner_pipe.as_fd(), &mut budget)
            .await
            .unwrap();
    });

    let child = Command::new("sleep").arg("5").kill_on_drop(true).spawn().unwrap();
    let pid = child.id().unwrap();
    let fake_helper = HelperProcess {
        child,
        pid,
        socket_path,
        password,
    };

    let manager = SpawnManager::new(HelperConfig {
        command: "/bin/true".into(),
        args: vec![],
        runtime_dir: dir.path().to_path_buf(),
    });

    let mut options = SpawnOptions::new("/srv/app");
    options.pool_account_username = Some("svc-1".to_string());
    options.pool_account_password_base64 = Some("secretpw".to_string());

    manager
        .try_spawn(Some(&fake_helper), &GroupName::new("/srv/app"), &options)
        .await
        .unwrap();

    server.await.unwrap();
}

/// §4.6: a spawn failure that carries an error page must surface it on
/// `EngineError::Spawn` so callers (the RPC listener) can relay it onward.
#[tokio::test]
async fn try_spawn_surfaces_the_helpers_error_page() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fake-helper.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let password = "test-password".to_string();
    let server_password = password.clone();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut budget = TimeoutBudget::unlimited();
        let pw = read_scalar_message(&mut stream, 1024, &mut budget).await.unwrap();
        assert_eq!(pw, server_password.as_bytes());
        let _request = read_array_message(&mut stream, &mut budget).await.unwrap();

        write_array_message(&mut stream, &[b"error_page"]).await.unwrap();
        pool_wire::write_scalar_message(&mut stream, b"<html>boom</html>")
            .await
            .unwrap();
    });

    let child = Command::new("sleep").arg("5").kill_on_drop(true).spawn().unwrap();
    let pid = child.id().unwrap();
    let fake_helper = HelperProcess {
        child,
        pid,
        socket_path,
        password,
    };

    let manager = SpawnManager::new(HelperConfig {
        command: "/bin/true".into(),
        args: vec![],
        runtime_dir: dir.path().to_path_buf(),
    });

    let err = manager
        .try_spawn(Some(&fake_helper), &GroupName::new("/srv/app"), &SpawnOptions::new("/srv/app"))
        .await
        .unwrap_err();

    match err {
        EngineError::Spawn { error_page, .. } => {
            assert_eq!(error_page.as_deref(), Some("<html>boom</html>"));
        }
        other => panic!("expected EngineError::Spawn, got {other:?}"),
    }

    server.await.unwrap();
}

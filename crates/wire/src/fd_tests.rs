// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::fd::AsFd;

#[tokio::test]
async fn fd_handshake_transfers_a_working_descriptor() {
    let (a, b) = UnixStream::pair().unwrap();
    let mut receiver = a;
    let mut sender = b;

    let file = tempfile::tempfile().unwrap();
    std::io::Write::write_all(&mut { file.try_clone().unwrap() }, b"payload").unwrap();

    let send_task = tokio::spawn(async move {
        let mut budget = TimeoutBudget::unlimited();
        send_fd(&mut sender, file.as_fd(), &mut budget).await.unwrap();
    });

    let mut budget = TimeoutBudget::unlimited();
    let received = recv_fd(&mut receiver, &mut budget).await.unwrap();
    send_task.await.unwrap();

    let mut contents = String::new();
    let mut received_file = std::fs::File::from(received);
    std::io::Seek::seek(&mut received_file, std::io::SeekFrom::Start(0)).unwrap();
    std::io::Read::read_to_string(&mut received_file, &mut contents).unwrap();
    assert_eq!(contents, "payload");
}

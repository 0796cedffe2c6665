// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn scalar_message_round_trips() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    write_scalar_message(&mut client, b"arbitrary opaque bytes")
        .await
        .unwrap();
    let mut budget = TimeoutBudget::unlimited();
    let body = read_scalar_message(&mut server, 1024, &mut budget)
        .await
        .unwrap();
    assert_eq!(body, b"arbitrary opaque bytes");
}

#[tokio::test]
async fn declared_length_over_cap_is_rejected_before_reading_body() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    write_scalar_message(&mut client, &[0u8; 100]).await.unwrap();
    let mut budget = TimeoutBudget::unlimited();
    let err = read_scalar_message(&mut server, 10, &mut budget)
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Security(_)));
}

#[tokio::test]
async fn empty_payload_round_trips() {
    let (mut client, mut server) = tokio::io::duplex(64);
    write_scalar_message(&mut client, &[]).await.unwrap();
    let mut budget = TimeoutBudget::unlimited();
    let body = read_scalar_message(&mut server, 10, &mut budget)
        .await
        .unwrap();
    assert!(body.is_empty());
}

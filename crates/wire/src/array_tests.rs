// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_array_round_trips() {
    let body = encode_array(&[]).unwrap();
    assert!(body.is_empty());
    assert_eq!(decode_array(&body), Vec::<Vec<u8>>::new());
}

#[test]
fn elements_round_trip_through_encode_decode() {
    let elements: &[&[u8]] = &[b"get", b"app-root", b""];
    let body = encode_array(elements).unwrap();
    let decoded = decode_array(&body);
    assert_eq!(
        decoded,
        vec![b"get".to_vec(), b"app-root".to_vec(), Vec::new()]
    );
}

#[test]
fn non_utf8_bytes_round_trip() {
    let weird: &[u8] = &[0xff, 0xfe, b'x'];
    let body = encode_array(&[weird]).unwrap();
    assert_eq!(decode_array(&body), vec![weird.to_vec()]);
}

#[test]
fn nul_byte_in_element_is_rejected() {
    let bad: &[u8] = b"a\0b";
    assert!(encode_array(&[bad]).is_err());
}

#[test]
fn oversized_body_is_rejected() {
    let huge = vec![b'x'; MAX_ARRAY_BODY_LEN];
    // one element of exactly the max body length minus its own terminator
    // is fine, but pushing the body past the 16-bit length ceiling fails.
    let elements: &[&[u8]] = &[&huge, &huge];
    assert!(matches!(
        encode_array(elements),
        Err(WireError::MessageTooLarge { .. })
    ));
}

#[tokio::test]
async fn write_then_read_round_trips_over_a_pipe() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    write_array_message_str(&mut client, &["hello", "get"])
        .await
        .unwrap();
    let mut budget = TimeoutBudget::unlimited();
    let msg = read_array_message(&mut server, &mut budget).await.unwrap();
    assert_eq!(msg, vec![b"hello".to_vec(), b"get".to_vec()]);
}

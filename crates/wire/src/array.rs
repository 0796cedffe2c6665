// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Array messages: a 16-bit big-endian length prefix followed by zero or
//! more byte strings, each terminated by a single `0x00` (§4.1, §8).
//!
//! Elements may contain any byte except `0x00`; the round-trip law only
//! promises fidelity for such elements, so encoding is kept on raw bytes
//! rather than `String` to avoid an unnecessary UTF-8 requirement.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::budget::TimeoutBudget;
use crate::error::WireError;
use crate::io_util::read_exact_with_budget;

/// Largest body an array message's 16-bit length prefix can address.
pub const MAX_ARRAY_BODY_LEN: usize = u16::MAX as usize;

/// Encode `elements` into the on-wire array message body.
pub fn encode_array(elements: &[&[u8]]) -> Result<Vec<u8>, WireError> {
    let mut body = Vec::new();
    for element in elements {
        if element.contains(&0u8) {
            return Err(WireError::Argument(
                "array message element may not contain a NUL byte".into(),
            ));
        }
        body.extend_from_slice(element);
        body.push(0);
    }
    if body.len() > MAX_ARRAY_BODY_LEN {
        return Err(WireError::MessageTooLarge {
            size: body.len(),
            max: MAX_ARRAY_BODY_LEN,
        });
    }
    Ok(body)
}

/// Split a decoded array message body back into its elements.
pub fn decode_array(body: &[u8]) -> Vec<Vec<u8>> {
    if body.is_empty() {
        return Vec::new();
    }
    let mut parts: Vec<Vec<u8>> = body.split(|&b| b == 0).map(|s| s.to_vec()).collect();
    if parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// Write an array message (length prefix plus encoded body) to `writer`.
pub async fn write_array_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    elements: &[&[u8]],
) -> Result<(), WireError> {
    let body = encode_array(elements)?;
    writer.write_all(&(body.len() as u16).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Convenience wrapper for the common case of all-UTF-8 elements.
pub async fn write_array_message_str<W: AsyncWrite + Unpin>(
    writer: &mut W,
    elements: &[&str],
) -> Result<(), WireError> {
    let bytes: Vec<&[u8]> = elements.iter().map(|s| s.as_bytes()).collect();
    write_array_message(writer, &bytes).await
}

/// Read one array message from `reader`, honoring `budget`.
pub async fn read_array_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    budget: &mut TimeoutBudget,
) -> Result<Vec<Vec<u8>>, WireError> {
    let mut len_buf = [0u8; 2];
    read_exact_with_budget(reader, &mut len_buf, budget).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    read_exact_with_budget(reader, &mut body, budget).await?;
    Ok(decode_array(&body))
}

#[cfg(test)]
#[path = "array_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scalar messages: a 32-bit big-endian length prefix followed by that many
//! opaque bytes, with no internal structure (§4.1).
//!
//! Readers must supply a cap on the declared length; a message claiming to
//! be larger than the cap is rejected before its body is read at all, so a
//! hostile or confused peer can't force an unbounded allocation (§8).

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::budget::TimeoutBudget;
use crate::error::WireError;
use crate::io_util::read_exact_with_budget;

/// Write a scalar message (length prefix plus raw payload) to `writer`.
pub async fn write_scalar_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), WireError> {
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| WireError::Argument("scalar message payload exceeds u32 length".into()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one scalar message from `reader`, rejecting any declared length
/// greater than `cap` before reading the body.
pub async fn read_scalar_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    cap: usize,
    budget: &mut TimeoutBudget,
) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 4];
    read_exact_with_budget(reader, &mut len_buf, budget).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > cap {
        return Err(WireError::Security(format!(
            "scalar message of {len} bytes exceeds cap of {cap} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    read_exact_with_budget(reader, &mut body, budget).await?;
    Ok(body)
}

#[cfg(test)]
#[path = "scalar_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared read helper that applies a [`TimeoutBudget`] to a single
//! `read_exact` call and charges the elapsed time back onto the budget.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::budget::TimeoutBudget;
use crate::error::WireError;

pub(crate) async fn read_exact_with_budget<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    budget: &mut TimeoutBudget,
) -> Result<(), WireError> {
    let start = Instant::now();
    let outcome = match budget.remaining() {
        Some(remaining) => match tokio::time::timeout(remaining, reader.read_exact(buf)).await {
            Ok(inner) => inner,
            Err(_) => {
                budget.charge(start.elapsed());
                return Err(WireError::Timeout);
            }
        },
        None => reader.read_exact(buf).await,
    };
    budget.charge(start.elapsed());
    outcome.map(|_| ()).map_err(WireError::from)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! On-wire message framing for the application pool's RPC channel (§4.1).
//!
//! Two message shapes cross every connection: array messages (used for
//! commands and their structured replies) and scalar messages (used for
//! opaque payloads such as the password challenge and the status FIFO
//! bytes). A third primitive, descriptor passing, rides on top of the
//! array-message framing to hand a client its own dedicated connection to a
//! spawned worker.

mod array;
mod budget;
mod error;
mod fd;
mod io_util;
mod scalar;

pub use array::{
    decode_array, encode_array, read_array_message, write_array_message,
    write_array_message_str, MAX_ARRAY_BODY_LEN,
};
pub use budget::TimeoutBudget;
pub use error::WireError;
pub use fd::{recv_fd, send_fd};
pub use scalar::{read_scalar_message, write_scalar_message};

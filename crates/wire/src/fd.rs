// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-descriptor passing over `AF_UNIX` sockets via `SCM_RIGHTS` (§4.1).
//!
//! The handshake has three legs, all at the array-message level except the
//! middle one:
//!
//! 1. the receiver sends `["pass IO"]`
//! 2. the sender transmits the descriptor as ancillary data on a one-byte
//!    dummy datagram
//! 3. the receiver sends `["got IO"]` once it has the descriptor in hand
//!
//! Step 2 is the only place raw `recvmsg`/`sendmsg` calls are needed; tokio
//! has no portable wrapper for ancillary data, so this module reaches for
//! `nix` directly and waits on the socket's own readiness rather than
//! blocking a worker thread.

#![allow(unsafe_code)]

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use nix::sys::uio::IoSlice;
use tokio::io::Interest;
use tokio::net::UnixStream;

use crate::array::{read_array_message, write_array_message_str};
use crate::budget::TimeoutBudget;
use crate::error::WireError;

const PASS_IO: &str = "pass IO";
const GOT_IO: &str = "got IO";

/// Receiver side of the handshake: ask for a descriptor and wait for it.
pub async fn recv_fd(
    stream: &mut UnixStream,
    budget: &mut TimeoutBudget,
) -> Result<OwnedFd, WireError> {
    write_array_message_str(stream, &[PASS_IO]).await?;

    let fd = loop {
        stream
            .readable()
            .await
            .map_err(|e| WireError::Io(e.to_string()))?;
        let raw = stream.as_raw_fd();
        match stream.try_io(Interest::READABLE, || recv_ancillary_fd(raw)) {
            Ok(result) => break result.map_err(|e| WireError::Io(e.to_string()))?,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(WireError::Io(e.to_string())),
        }
    };

    write_array_message_str(stream, &[GOT_IO]).await?;
    Ok(fd)
}

/// Sender side of the handshake: wait to be asked, then hand over `fd`.
pub async fn send_fd(
    stream: &mut UnixStream,
    fd: BorrowedFd<'_>,
    budget: &mut TimeoutBudget,
) -> Result<(), WireError> {
    let request = read_array_message(stream, budget).await?;
    if request.first().map(Vec::as_slice) != Some(PASS_IO.as_bytes()) {
        return Err(WireError::Protocol(
            "expected a \"pass IO\" handshake message".into(),
        ));
    }

    let raw = fd.as_raw_fd();
    loop {
        stream
            .writable()
            .await
            .map_err(|e| WireError::Io(e.to_string()))?;
        let sock = stream.as_raw_fd();
        match stream.try_io(Interest::WRITABLE, || send_ancillary_fd(sock, raw)) {
            Ok(result) => {
                result.map_err(|e| WireError::Io(e.to_string()))?;
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(WireError::Io(e.to_string())),
        }
    }

    let ack = read_array_message(stream, budget).await?;
    if ack.first().map(Vec::as_slice) != Some(GOT_IO.as_bytes()) {
        return Err(WireError::Protocol(
            "expected a \"got IO\" acknowledgement".into(),
        ));
    }
    Ok(())
}

fn recv_ancillary_fd(sock: RawFd) -> io::Result<OwnedFd> {
    let mut dummy = [0u8; 1];
    let mut iov = [std::io::IoSliceMut::new(&mut dummy)];
    let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

    let msg = recvmsg::<()>(sock, &mut iov, Some(&mut cmsg_space), MsgFlags::empty())
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;

    for cmsg in msg.cmsgs().map_err(|e| io::Error::other(e.to_string()))? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(raw) = fds.into_iter().next() {
                // SAFETY: the kernel just duplicated this descriptor into our
                // process via SCM_RIGHTS; we are its sole owner from here on.
                return Ok(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }
    }
    Err(io::Error::other("no descriptor present in SCM_RIGHTS data"))
}

fn send_ancillary_fd(sock: RawFd, payload_fd: RawFd) -> io::Result<()> {
    let dummy = [0u8];
    let iov = [IoSlice::new(&dummy)];
    let fds = [payload_fd];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(sock, &iov, &cmsgs, MsgFlags::empty(), None)
        .map(|_| ())
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
}

#[cfg(test)]
#[path = "fd_tests.rs"]
mod tests;

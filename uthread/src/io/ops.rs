// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::Error;
use mio::Interest;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

/// Sets `O_NONBLOCK` on `fd`, leaving its other flags untouched. Idempotent:
/// setting a flag that is already set is a no-op as far as the kernel is
/// concerned, so callers don't need to track whether this already ran.
fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    // Safety: `fd` is a valid, open descriptor for the duration of this call.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Reads from `source` into `buf`, parking the calling task (not the
/// worker thread) whenever the socket would otherwise block.
pub fn socket_read<S: Read + AsRawFd>(source: &mut S, buf: &mut [u8]) -> Result<usize, Error> {
    set_nonblocking(source.as_raw_fd()).map_err(Error::Io)?;
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                super::park_for(source.as_raw_fd(), Interest::READABLE)?;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Writes `buf` to `source`, parking the calling task whenever the socket
/// would otherwise block.
pub fn socket_write<S: Write + AsRawFd>(source: &mut S, buf: &[u8]) -> Result<usize, Error> {
    set_nonblocking(source.as_raw_fd()).map_err(Error::Io)?;
    loop {
        match source.write(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                super::park_for(source.as_raw_fd(), Interest::WRITABLE)?;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Accepts one connection on `listener`, parking the calling task whenever
/// none is yet available.
pub fn socket_accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), Error> {
    set_nonblocking(listener.as_raw_fd()).map_err(Error::Io)?;
    loop {
        match listener.accept() {
            Ok(pair) => return Ok(pair),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                super::park_for(listener.as_raw_fd(), Interest::READABLE)?;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

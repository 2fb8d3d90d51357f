//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Network side of a session

use crate::config::KeepaliveConfig;
use crate::pty::set_nonblocking_cloexec;
use crate::{DaemonError, Result};
use nix::sys::socket::{SockaddrStorage, getpeername, setsockopt, sockopt};
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use tracing::debug;

/// The client connection of one session
///
/// Accepted connections read and write the same socket. Under inetd the
/// connection arrives as stdin and stdout, which may be distinct descriptors.
#[derive(Debug)]
pub enum Peer {
    /// A connection accepted on our listening socket
    Tcp(TcpStream),
    /// Descriptors handed over by a supervisor
    Inherited {
        /// Descriptor read from
        input: File,
        /// Descriptor written to
        output: File,
    },
}

impl Peer {
    /// Takes over stdin and stdout as the client connection.
    ///
    /// Must be called at most once per process.
    pub fn inherited() -> Result<Self> {
        for fd in [0, 1] {
            if nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFD).is_err() {
                return Err(DaemonError::InheritedDescriptor(format!("descriptor {fd} is not open")));
            }
        }
        // SAFETY: descriptors 0 and 1 are open and this is their only owner from now on.
        let (input, output) = unsafe { (File::from_raw_fd(0), File::from_raw_fd(1)) };
        Ok(Self::Inherited { input, output })
    }

    /// Builds a peer from separate read and write descriptors.
    pub fn from_split(input: OwnedFd, output: OwnedFd) -> Self {
        Self::Inherited {
            input: File::from(input),
            output: File::from(output),
        }
    }

    /// Descriptor polled for client input.
    pub fn read_fd(&self) -> BorrowedFd<'_> {
        match self {
            Peer::Tcp(stream) => stream.as_fd(),
            Peer::Inherited { input, .. } => input.as_fd(),
        }
    }

    /// Descriptor polled for client output.
    pub fn write_fd(&self) -> BorrowedFd<'_> {
        match self {
            Peer::Tcp(stream) => stream.as_fd(),
            Peer::Inherited { output, .. } => output.as_fd(),
        }
    }

    /// Highest descriptor number in use.
    pub fn max_fd(&self) -> i32 {
        self.read_fd().as_raw_fd().max(self.write_fd().as_raw_fd())
    }

    /// Address of the remote end, if the descriptor is an IP socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Peer::Tcp(stream) => stream.peer_addr().ok(),
            Peer::Inherited { input, .. } => {
                let storage = getpeername::<SockaddrStorage>(input.as_raw_fd()).ok()?;
                if let Some(sin) = storage.as_sockaddr_in() {
                    Some(SocketAddr::V4(SocketAddrV4::from(*sin)))
                } else {
                    storage
                        .as_sockaddr_in6()
                        .map(|sin6| SocketAddr::V6(SocketAddrV6::from(*sin6)))
                }
            }
        }
    }

    /// Makes the descriptors non-blocking and close-on-exec and enables keep-alive.
    ///
    /// Keep-alive timing is only tuned on connections we accepted ourselves;
    /// an inherited connection belongs to the supervisor's policy. Keep-alive
    /// failures are logged and ignored, the descriptor may not even be a socket.
    pub fn prepare(&self, keepalive: &KeepaliveConfig) -> Result<()> {
        set_nonblocking_cloexec(&self.read_fd())?;
        set_nonblocking_cloexec(&self.write_fd())?;

        let socket = self.read_fd();
        if let Err(errno) = setsockopt(&socket, sockopt::KeepAlive, &true) {
            debug!("SO_KEEPALIVE not applied: {}", errno);
            return Ok(());
        }
        if let Peer::Tcp(_) = self {
            tune_keepalive(&socket, keepalive);
        }
        Ok(())
    }

    /// Writes all of `bytes`, bypassing any escaping.
    ///
    /// Used for the negotiation preamble on a fresh connection whose send
    /// buffer is empty.
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn tune_keepalive(socket: &BorrowedFd<'_>, keepalive: &KeepaliveConfig) {
    let secs = |duration: std::time::Duration| u32::try_from(duration.as_secs()).unwrap_or(u32::MAX);
    let result = setsockopt(socket, sockopt::TcpKeepIdle, &secs(keepalive.idle))
        .and_then(|()| setsockopt(socket, sockopt::TcpKeepInterval, &secs(keepalive.interval)))
        .and_then(|()| setsockopt(socket, sockopt::TcpKeepCount, &keepalive.count));
    if let Err(errno) = result {
        debug!("TCP keep-alive tuning not applied: {}", errno);
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn tune_keepalive(_socket: &BorrowedFd<'_>, _keepalive: &KeepaliveConfig) {}

impl Read for Peer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Peer::Tcp(stream) => stream.read(buf),
            Peer::Inherited { input, .. } => input.read(buf),
        }
    }
}

impl Write for Peer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Peer::Tcp(stream) => stream.write(buf),
            Peer::Inherited { output, .. } => output.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::unix::net::UnixStream;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_tcp_peer_prepare() {
        let (server, client) = tcp_pair();
        let peer = Peer::Tcp(server);
        peer.prepare(&KeepaliveConfig::default()).unwrap();

        assert!(getsockopt_keepalive(&peer));
        assert_eq!(peer.peer_addr(), client.local_addr().ok());
        assert_eq!(peer.read_fd().as_raw_fd(), peer.write_fd().as_raw_fd());
    }

    #[test]
    fn test_prepare_makes_reads_nonblocking() {
        let (server, _client) = tcp_pair();
        let mut peer = Peer::Tcp(server);
        peer.prepare(&KeepaliveConfig::default()).unwrap();

        let mut buf = [0u8; 8];
        let err = peer.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_split_peer_uses_both_descriptors() {
        let (input_local, input_remote) = UnixStream::pair().unwrap();
        let (output_local, output_remote) = UnixStream::pair().unwrap();
        let mut peer = Peer::from_split(OwnedFd::from(input_local), OwnedFd::from(output_local));
        // Not a socket with keep-alive semantics; must still succeed.
        peer.prepare(&KeepaliveConfig::default()).unwrap();
        assert_ne!(peer.read_fd().as_raw_fd(), peer.write_fd().as_raw_fd());
        assert_eq!(peer.peer_addr(), None);

        (&input_remote).write_all(b"in").unwrap();
        let mut buf = [0u8; 8];
        let count = peer.read(&mut buf).unwrap();
        assert_eq!(&buf[..count], b"in");

        peer.send_raw(b"out").unwrap();
        let mut buf = [0u8; 8];
        let count = (&output_remote).read(&mut buf).unwrap();
        assert_eq!(&buf[..count], b"out");
    }

    fn getsockopt_keepalive(peer: &Peer) -> bool {
        nix::sys::socket::getsockopt(&peer.read_fd(), sockopt::KeepAlive).unwrap()
    }
}

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

//! Session record and per-session relay state machine

use crate::accounting::Accounting;
use crate::banner::load_issue;
use crate::config::DaemonConfig;
use crate::metrics::DaemonMetrics;
use crate::peer::Peer;
use crate::pty::{Pty, set_window_size};
use crate::spawn::spawn_login;
use crate::Result;
use nix::errno::Errno;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};
use telnetd_codec::consts::NUL;
use telnetd_codec::{IacDoubler, IacFilter, PREAMBLE, RingBuffer};
use tracing::{debug, info, instrument, trace};

/// Unique identifier for a session (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// The four transfers a session can make, used both for the readiness a
/// session asks for and for the readiness the multiplexer reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfers {
    /// Write filtered client input to the terminal
    pub tty_write: bool,
    /// Write escaped terminal output to the client
    pub net_write: bool,
    /// Read client input
    pub net_read: bool,
    /// Read terminal output
    pub tty_read: bool,
}

impl Transfers {
    /// True when no transfer is wanted.
    pub fn is_empty(self) -> bool {
        self == Self::default()
    }
}

/// Why a session ended
#[derive(Debug)]
pub enum CloseReason {
    /// The client closed its connection
    PeerClosed,
    /// The terminal hung up and all its output reached the client
    TerminalHangup,
    /// The child exited and the session closes without draining
    ChildExited,
    /// An unrecoverable read or write failure
    Io(io::Error),
    /// The daemon is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::TerminalHangup => write!(f, "terminal hung up"),
            CloseReason::ChildExited => write!(f, "child exited"),
            CloseReason::Io(err) => write!(f, "I/O error: {err}"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// State of the process attached to the terminal
#[derive(Debug)]
enum ChildState {
    Running(Child),
    Exited(ExitStatus),
    Detached,
}

/// One client connected through to one login process
pub struct Session {
    id: SessionId,
    child: ChildState,
    child_pid: Option<u32>,
    pty: File,
    line: String,
    peer: Peer,
    peer_addr: Option<SocketAddr>,

    // Network to terminal
    to_tty: RingBuffer,
    filter: IacFilter,
    // Terminal to network
    to_net: RingBuffer,
    doubler: IacDoubler,

    /// The queued client input is only an unfinished command.
    awaiting_tail: bool,
    terminal_closed: bool,
    dead: bool,
    opened_at: Instant,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("child", &self.child)
            .field("line", &self.line)
            .field("peer_addr", &self.peer_addr)
            .field("to_tty", &self.to_tty)
            .field("to_net", &self.to_net)
            .field("terminal_closed", &self.terminal_closed)
            .field("dead", &self.dead)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Sets up a session for a freshly accepted or inherited connection.
    ///
    /// Allocates a terminal, prepares the connection, sends the negotiation
    /// preamble and starts the login program. On failure everything acquired
    /// so far, the connection included, is released.
    #[instrument(skip(peer, config, accounting), fields(session_id = %id))]
    pub fn open(id: SessionId, mut peer: Peer, config: &DaemonConfig, accounting: Accounting) -> Result<Self> {
        let pty = Pty::open()?;
        peer.prepare(&config.keepalive)?;
        peer.send_raw(&PREAMBLE)?;

        let slave = pty.open_slave()?;
        let banner = load_issue(&config.issue_file, pty.line());
        let child = spawn_login(&config.login_program, slave, banner)?;

        let line = pty.line().to_string();
        let (master, _) = pty.into_parts();
        let session = Self::from_parts(id, master, line, peer, Some(child));
        if let Some(pid) = session.child_pid {
            accounting.login(pid, &session.line, session.peer_addr);
        }
        info!(
            peer_addr = ?session.peer_addr,
            line = %session.line,
            pid = ?session.child_pid,
            "Session opened"
        );
        Ok(session)
    }

    /// Assembles a session from already prepared parts.
    ///
    /// `pty` must be non-blocking. Without a child the session runs until
    /// either side closes.
    pub fn from_parts(id: SessionId, pty: File, line: String, peer: Peer, child: Option<Child>) -> Self {
        let peer_addr = peer.peer_addr();
        let child_pid = child.as_ref().map(Child::id);
        Self {
            id,
            child: child.map_or(ChildState::Detached, ChildState::Running),
            child_pid,
            pty,
            line,
            peer,
            peer_addr,
            to_tty: RingBuffer::new(),
            filter: IacFilter::new(),
            to_net: RingBuffer::new(),
            doubler: IacDoubler::new(),
            awaiting_tail: false,
            terminal_closed: false,
            dead: false,
            opened_at: Instant::now(),
        }
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Terminal line name, e.g. `pts/3`
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Remote address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Process id of the login program, if one was started
    pub fn child_pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// Exit status of the login program once it has been reaped
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.child {
            ChildState::Exited(status) => Some(status),
            _ => None,
        }
    }

    /// Terminal master descriptor
    pub fn pty_fd(&self) -> BorrowedFd<'_> {
        self.pty.as_fd()
    }

    /// Client connection
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Highest descriptor number owned by this session
    pub fn max_fd(&self) -> RawFd {
        self.pty.as_raw_fd().max(self.peer.max_fd())
    }

    /// True once the terminal side hung up
    pub fn is_terminal_closed(&self) -> bool {
        self.terminal_closed
    }

    /// Bytes queued toward the terminal
    pub fn pending_to_terminal(&self) -> usize {
        self.to_tty.len()
    }

    /// Bytes queued toward the client
    pub fn pending_to_network(&self) -> usize {
        self.to_net.len()
    }

    /// Time since the session was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// True once the session is waiting to be torn down.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Flags the session for teardown at the next scan.
    pub fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Reaps the child if it has exited. Returns the status the first time it is seen.
    pub fn reap_child(&mut self) -> Option<ExitStatus> {
        let ChildState::Running(child) = &mut self.child else {
            return None;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(session_id = %self.id, %status, "login program exited");
                self.child = ChildState::Exited(status);
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                debug!(session_id = %self.id, "cannot poll child: {}", err);
                None
            }
        }
    }

    /// Readiness the session is waiting for.
    ///
    /// A dead session asks for nothing.
    pub fn interest(&self) -> Transfers {
        if self.dead {
            return Transfers::default();
        }
        Transfers {
            tty_write: !self.terminal_closed && !self.to_tty.is_empty() && !self.awaiting_tail,
            net_write: !self.to_net.is_empty(),
            net_read: !self.to_tty.is_full(),
            tty_read: !self.terminal_closed && !self.to_net.is_full(),
        }
    }

    /// Moves data in the directions that are ready.
    ///
    /// Returns the reason the session has to close, if it does. Transfers
    /// that would block are skipped until the next call.
    pub fn relay(&mut self, ready: Transfers, metrics: &DaemonMetrics) -> Option<CloseReason> {
        if ready.tty_write && !self.to_tty.is_empty() && !self.terminal_closed {
            if let Err(err) = self.write_terminal() {
                return Some(CloseReason::Io(err));
            }
        }

        if ready.net_write && !self.to_net.is_empty() {
            if let Err(err) = self.write_network(metrics) {
                return Some(CloseReason::Io(err));
            }
        }

        self.to_tty.reset_if_empty();
        self.to_net.reset_if_empty();

        if ready.net_read && !self.to_tty.is_full() {
            if let Some(reason) = self.read_network(metrics) {
                return Some(reason);
            }
        }

        if ready.tty_read && !self.terminal_closed && !self.to_net.is_full() {
            if let Err(err) = self.read_terminal() {
                return Some(CloseReason::Io(err));
            }
        }

        if self.terminal_closed && self.to_net.is_empty() {
            return Some(CloseReason::TerminalHangup);
        }
        None
    }

    fn write_terminal(&mut self) -> io::Result<()> {
        let pty = &self.pty;
        let id = self.id;
        let ready = self.filter.filter(&mut self.to_tty, |size| {
            if let Err(errno) = set_window_size(pty, size) {
                debug!(session_id = %id, "window size {} not applied: {}", size, errno);
            }
        });
        if ready == 0 {
            self.awaiting_tail = !self.to_tty.is_empty();
            return Ok(());
        }
        match (&self.pty).write(&self.to_tty.readable()[..ready]) {
            Ok(written) => {
                trace!(session_id = %self.id, written, "to terminal");
                self.to_tty.consume(written);
                self.filter.advance(written);
                Ok(())
            }
            Err(err) if is_retry(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn write_network(&mut self, metrics: &DaemonMetrics) -> io::Result<()> {
        match self.doubler.write_escaped(&mut self.peer, self.to_net.readable()) {
            Ok(consumed) => {
                trace!(session_id = %self.id, consumed, "to network");
                self.to_net.consume(consumed);
                metrics.bytes_to_network(consumed);
                Ok(())
            }
            Err(partial) => {
                self.to_net.consume(partial.written);
                metrics.bytes_to_network(partial.written);
                if is_retry(&partial.source) {
                    Ok(())
                } else {
                    Err(partial.source)
                }
            }
        }
    }

    fn read_network(&mut self, metrics: &DaemonMetrics) -> Option<CloseReason> {
        let span = self.to_tty.writable();
        match self.peer.read(span) {
            Ok(0) => Some(CloseReason::PeerClosed),
            Ok(count) => {
                metrics.bytes_from_network(count);
                // A lone NUL closing a read is client padding, not data.
                let keep = if span[count - 1] == NUL { count - 1 } else { count };
                trace!(session_id = %self.id, count, keep, "from network");
                self.to_tty.commit(keep);
                self.awaiting_tail = false;
                None
            }
            Err(err) if is_retry(&err) => None,
            Err(err) => Some(CloseReason::Io(err)),
        }
    }

    fn read_terminal(&mut self) -> io::Result<()> {
        match (&self.pty).read(self.to_net.writable()) {
            Ok(0) => {
                self.hangup();
                Ok(())
            }
            Ok(count) => {
                trace!(session_id = %self.id, count, "from terminal");
                self.to_net.commit(count);
                Ok(())
            }
            Err(err) if err.raw_os_error() == Some(Errno::EIO as i32) => {
                self.hangup();
                Ok(())
            }
            Err(err) if is_retry(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn hangup(&mut self) {
        debug!(session_id = %self.id, pending = self.to_net.len(), "terminal hung up");
        self.terminal_closed = true;
        // Client input has nowhere to go any more.
        while !self.to_tty.is_empty() {
            self.to_tty.consume(self.to_tty.readable().len());
        }
        self.filter.reset();
        self.awaiting_tail = false;
    }

    /// Tears the session down, releasing every resource it holds.
    ///
    /// A login program still running is killed and reaped, the accounting
    /// record is closed and both descriptors are dropped. Returns how long the
    /// session lived.
    pub fn close(mut self, reason: &CloseReason, accounting: Accounting) -> Duration {
        if let ChildState::Running(child) = &mut self.child {
            if let Err(err) = child.kill() {
                debug!(session_id = %self.id, "kill failed: {}", err);
            }
            match child.wait() {
                Ok(status) => self.child = ChildState::Exited(status),
                Err(err) => debug!(session_id = %self.id, "wait failed: {}", err),
            }
        }
        if let Some(pid) = self.child_pid {
            accounting.logout(pid, &self.line);
        }
        let age = self.age();
        info!(
            session_id = %self.id,
            peer_addr = ?self.peer_addr,
            reason = %reason,
            duration = ?age,
            "Session closed"
        );
        age
    }
}

fn is_retry(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

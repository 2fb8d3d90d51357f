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

//! The event loop
//!
//! One thread owns every session. Each [`Daemon::turn`] sweeps sessions whose
//! child was flagged dead, builds a poll set from what every remaining session
//! is waiting for, blocks in `poll`, then accepts at most one connection and
//! runs the relay state machine of every session that became ready. Sessions
//! that fail are collected during the scan and torn down after it.

use crate::accounting::Accounting;
use crate::admission::AdmissionControl;
use crate::config::{DaemonConfig, Mode};
use crate::metrics::DaemonMetrics;
use crate::peer::Peer;
use crate::reaper::{SignalWatch, reap_sessions};
use crate::registry::{Registry, SessionKey};
use crate::session::{CloseReason, Session, SessionId, Transfers};
use crate::{DaemonError, Result};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{SockaddrStorage, getsockname};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, RawFd};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Result of one event loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Keep going
    Continue,
    /// The daemon is done and the process should exit successfully
    Exit,
}

/// Positions of one session's descriptors in the poll set
#[derive(Debug)]
struct Polled {
    key: SessionKey,
    interest: Transfers,
    pty: Option<usize>,
    net_read: Option<usize>,
    net_write: Option<usize>,
}

/// The relay daemon
#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    listener: Option<TcpListener>,
    registry: Registry,
    admission: AdmissionControl,
    accounting: Accounting,
    signals: SignalWatch,
    metrics: DaemonMetrics,
    next_id: u64,
    idle_since: Option<Instant>,
}

impl Daemon {
    /// Sets the daemon up for `config.mode`.
    ///
    /// Standalone mode binds the listening socket, inetd wait mode takes it
    /// from stdin and inetd mode turns stdin/stdout into the only session.
    /// Failing to create that session is an error.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        config.validate().map_err(DaemonError::InvalidConfig)?;
        match config.mode {
            Mode::Standalone => {
                let listener = bind_listener(config.bind_address)?;
                Self::with_listener(config, listener)
            }
            Mode::InetdWait { .. } => {
                let listener = inherited_listener()?;
                Self::with_listener(config, listener)
            }
            Mode::Inetd => Self::with_peer(config, Peer::inherited()?),
        }
    }

    /// Serves connections arriving on an already bound `listener`.
    ///
    /// `config.mode` must be one that listens.
    pub fn with_listener(config: DaemonConfig, listener: TcpListener) -> Result<Self> {
        if !config.mode.has_listener() {
            return Err(DaemonError::InvalidConfig(format!(
                "{:?} mode does not accept connections",
                config.mode
            )));
        }
        listener.set_nonblocking(true)?;
        Self::assemble(config, Some(listener))
    }

    /// Serves `peer` as the only session; the daemon is done when it ends.
    ///
    /// `config.mode` must be one without a listener.
    pub fn with_peer(config: DaemonConfig, peer: Peer) -> Result<Self> {
        if config.mode.has_listener() {
            return Err(DaemonError::InvalidConfig(format!(
                "{:?} mode needs a listening socket",
                config.mode
            )));
        }
        let mut daemon = Self::assemble(config, None)?;
        daemon.open_session(peer)?;
        Ok(daemon)
    }

    fn assemble(config: DaemonConfig, listener: Option<TcpListener>) -> Result<Self> {
        config.validate().map_err(DaemonError::InvalidConfig)?;
        Ok(Self {
            registry: Registry::new(listener.as_ref().map(AsRawFd::as_raw_fd)),
            admission: AdmissionControl::new(config.max_sessions),
            accounting: Accounting::new(config.accounting),
            signals: SignalWatch::install()?,
            metrics: DaemonMetrics::new(),
            next_id: 1,
            idle_since: None,
            listener,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Get the live sessions
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the daemon metrics
    pub fn metrics(&self) -> &DaemonMetrics {
        &self.metrics
    }

    /// Address of the listening socket, if there is one
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    /// Asks the loop to tear everything down at its next iteration.
    pub fn request_shutdown(&self) {
        self.signals.request_terminate();
    }

    /// Runs until shutdown, the inetd session ending or the wait-mode linger expiring.
    pub fn run(&mut self) -> Result<()> {
        info!(
            addr = ?self.local_addr(),
            mode = ?self.config.mode,
            max_sessions = self.admission.max_sessions(),
            "Telnet daemon running"
        );
        while self.turn(None)? == Turn::Continue {}

        let snapshot = self.metrics.snapshot();
        info!(
            total_sessions = snapshot.total_sessions,
            rejected_sessions = snapshot.rejected_sessions,
            bytes_from_network = snapshot.bytes_from_network,
            bytes_to_network = snapshot.bytes_to_network,
            failures = snapshot.total_failures(),
            uptime = ?snapshot.uptime,
            "Telnet daemon stopped"
        );
        Ok(())
    }

    /// Runs one iteration of the event loop.
    ///
    /// `timeout` bounds the wait for readiness; `None` waits indefinitely
    /// unless the wait-mode linger applies.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<Turn> {
        if self.signals.terminate_requested() {
            self.shutdown();
            return Ok(Turn::Exit);
        }

        self.sweep_dead();
        if self.listener.is_none() && self.registry.is_empty() {
            return Ok(Turn::Exit);
        }

        let now = Instant::now();
        if self.registry.is_empty() {
            self.idle_since.get_or_insert(now);
        } else {
            self.idle_since = None;
        }
        let linger_deadline = self
            .idle_since
            .zip(self.config.mode.linger())
            .map(|(since, linger)| since + linger);
        let deadline = match (timeout.map(|timeout| now + timeout), linger_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut polled = Vec::with_capacity(self.registry.len());
        let (count, revents, listener_slot) = {
            let mut fds = Vec::with_capacity(2 + 3 * self.registry.len());
            fds.push(PollFd::new(self.signals.fd(), PollFlags::POLLIN));
            let listener_slot = self
                .listener
                .as_ref()
                .and_then(|listener| push(&mut fds, listener.as_fd(), PollFlags::POLLIN));

            for (key, session) in self.registry.iter() {
                let interest = session.interest();
                if interest.is_empty() {
                    continue;
                }
                let pty = push(&mut fds, session.pty_fd(), flags(interest.tty_read, interest.tty_write));
                let peer = session.peer();
                let (net_read, net_write) = if peer.read_fd().as_raw_fd() == peer.write_fd().as_raw_fd() {
                    let slot = push(&mut fds, peer.read_fd(), flags(interest.net_read, interest.net_write));
                    (slot, slot)
                } else {
                    (
                        push(&mut fds, peer.read_fd(), flags(interest.net_read, false)),
                        push(&mut fds, peer.write_fd(), flags(false, interest.net_write)),
                    )
                };
                polled.push(Polled {
                    key,
                    interest,
                    pty,
                    net_read,
                    net_write,
                });
            }

            let count = wait(&mut fds, deadline)?;
            let revents: Vec<PollFlags> = fds
                .iter()
                .map(|fd| fd.revents().unwrap_or_else(PollFlags::empty))
                .collect();
            (count, revents, listener_slot)
        };

        if revents[0].intersects(PollFlags::POLLIN) {
            let signals = self.signals.drain();
            trace!(signals, "signal pipe drained");
            reap_sessions(&mut self.registry, self.config.close_on_child_exit);
            if self.signals.terminate_requested() {
                self.shutdown();
                return Ok(Turn::Exit);
            }
        }

        if count == 0 {
            if linger_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!("No sessions within the wait linger, exiting");
                return Ok(Turn::Exit);
            }
            return Ok(Turn::Continue);
        }

        if listener_slot.is_some_and(|slot| fired(&revents, Some(slot), PollFlags::POLLIN)) && !self.accept_connection() {
            return Ok(Turn::Continue);
        }

        let mut finished = Vec::new();
        for entry in &polled {
            let ready = Transfers {
                tty_write: entry.interest.tty_write && fired(&revents, entry.pty, PollFlags::POLLOUT),
                net_write: entry.interest.net_write && fired(&revents, entry.net_write, PollFlags::POLLOUT),
                net_read: entry.interest.net_read && fired(&revents, entry.net_read, PollFlags::POLLIN),
                tty_read: entry.interest.tty_read && fired(&revents, entry.pty, PollFlags::POLLIN),
            };
            if ready.is_empty() {
                continue;
            }
            let Some(session) = self.registry.get_mut(entry.key) else {
                continue;
            };
            if let Some(reason) = session.relay(ready, &self.metrics) {
                finished.push((entry.key, reason));
            }
        }
        for (key, reason) in finished {
            self.teardown(key, &reason);
        }

        if self.listener.is_none() && self.registry.is_empty() {
            return Ok(Turn::Exit);
        }
        Ok(Turn::Continue)
    }

    /// Tears down every session.
    pub fn shutdown(&mut self) {
        let keys = self.registry.keys();
        if !keys.is_empty() {
            info!(sessions = keys.len(), "Closing all sessions");
        }
        for key in keys {
            self.teardown(key, &CloseReason::Shutdown);
        }
    }

    /// Accepts one pending connection. Returns false if accepting failed.
    fn accept_connection(&mut self) -> bool {
        let Some(listener) = &self.listener else {
            return true;
        };
        match listener.accept() {
            Ok((stream, addr)) => {
                if !self.admission.admit(&self.registry) {
                    debug!(%addr, max_sessions = self.admission.max_sessions(), "Connection refused at capacity");
                    self.metrics.session_rejected();
                    drop(stream);
                    return true;
                }
                if let Err(err) = self.open_session(Peer::Tcp(stream)) {
                    if err.is_resource_exhaustion() {
                        warn!(%addr, "Session setup abandoned: {}", err);
                    } else {
                        error!(%addr, "Session setup failed: {}", err);
                    }
                }
                true
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => true,
            Err(err) => {
                let err = DaemonError::from(err);
                if err.is_resource_exhaustion() {
                    warn!("Accept failed: {}", err);
                    self.metrics.resource_exhausted();
                } else {
                    error!("Accept failed: {}", err);
                }
                self.metrics.accept_failure();
                false
            }
        }
    }

    fn open_session(&mut self, peer: Peer) -> Result<SessionKey> {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        match Session::open(id, peer, &self.config, self.accounting) {
            Ok(session) => {
                self.metrics.session_opened();
                let key = self.registry.insert(session);
                debug!(session_id = %id, %key, sessions = self.registry.len(), "session registered");
                Ok(key)
            }
            Err(err) => {
                if matches!(err, DaemonError::Spawn { .. }) {
                    self.metrics.spawn_failure();
                }
                if err.is_resource_exhaustion() {
                    self.metrics.resource_exhausted();
                }
                Err(err)
            }
        }
    }

    /// Removes sessions flagged dead since the last scan.
    fn sweep_dead(&mut self) {
        let dead: Vec<SessionKey> = self
            .registry
            .iter()
            .filter(|(_, session)| session.is_dead())
            .map(|(key, _)| key)
            .collect();
        for key in dead {
            self.teardown(key, &CloseReason::ChildExited);
        }
    }

    fn teardown(&mut self, key: SessionKey, reason: &CloseReason) {
        if let Some(session) = self.registry.remove(key) {
            let age = session.close(reason, self.accounting);
            self.metrics.session_closed(age);
            debug!(%key, sessions = self.registry.len(), max_fd = self.registry.max_fd(), "session removed");
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).map_err(|source| DaemonError::Bind { addr, source })
}

/// Takes the listening socket handed over on stdin.
fn inherited_listener() -> Result<TcpListener> {
    adopt_listener(0)
}

/// Takes ownership of `fd` if it is a socket; anything else is left alone.
fn adopt_listener(fd: RawFd) -> Result<TcpListener> {
    if let Err(errno) = getsockname::<SockaddrStorage>(fd) {
        return Err(DaemonError::InheritedDescriptor(format!("descriptor {fd} is not a socket: {errno}")));
    }
    // SAFETY: `fd` is an open socket owned by nothing else in this process.
    Ok(unsafe { TcpListener::from_raw_fd(fd) })
}

fn flags(read: bool, write: bool) -> PollFlags {
    let mut flags = PollFlags::empty();
    if read {
        flags |= PollFlags::POLLIN;
    }
    if write {
        flags |= PollFlags::POLLOUT;
    }
    flags
}

/// Adds a descriptor to the poll set unless there is nothing to wait for.
fn push<'fd>(fds: &mut Vec<PollFd<'fd>>, fd: BorrowedFd<'fd>, events: PollFlags) -> Option<usize> {
    if events.is_empty() {
        return None;
    }
    fds.push(PollFd::new(fd, events));
    Some(fds.len() - 1)
}

/// True if the descriptor at `slot` reported `wanted`, or an error or hangup
/// that the next read or write will surface.
fn fired(revents: &[PollFlags], slot: Option<usize>, wanted: PollFlags) -> bool {
    slot.is_some_and(|slot| revents[slot].intersects(wanted | PollFlags::POLLERR | PollFlags::POLLHUP))
}

/// Blocks until a descriptor is ready or `deadline` passes.
///
/// Interrupted and transiently failing waits are retried toward the same
/// deadline.
fn wait(fds: &mut [PollFd<'_>], deadline: Option<Instant>) -> Result<usize> {
    loop {
        let timeout = match deadline {
            None => PollTimeout::NONE,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(0);
                }
                let millis = remaining.as_micros().div_ceil(1000);
                PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
            }
        };
        match poll(fds, timeout) {
            Ok(0) => {}
            Ok(count) => return Ok(usize::try_from(count).unwrap_or_default()),
            Err(errno) => {
                let err = DaemonError::Sys(errno);
                if !err.is_transient() {
                    return Err(err);
                }
                trace!("poll interrupted: {}", errno);
            }
        }
    }
}

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

//! Signal delivery and child reaping
//!
//! Signal handlers never touch the registry. They only write a byte into a
//! self-pipe that the event loop polls, and raise the termination flag for
//! SIGINT and SIGTERM. When the pipe becomes readable the loop drains it and
//! calls [`reap_sessions`], which is where exited children are collected and
//! their sessions flagged.

use crate::registry::Registry;
use signal_hook::consts::{SIGCHLD, SIGINT, SIGTERM};
use signal_hook::{SigId, flag, low_level};
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Signals that end the daemon
const TERMINATE: [i32; 2] = [SIGINT, SIGTERM];

/// Wake-up pipe and termination flag fed by signal handlers
#[derive(Debug)]
pub struct SignalWatch {
    wake: UnixStream,
    terminate: Arc<AtomicBool>,
    handlers: Vec<SigId>,
}

impl SignalWatch {
    /// Installs handlers for SIGCHLD, SIGINT and SIGTERM.
    pub fn install() -> io::Result<Self> {
        let (wake, notify) = UnixStream::pair()?;
        wake.set_nonblocking(true)?;
        notify.set_nonblocking(true)?;

        let terminate = Arc::new(AtomicBool::new(false));
        let mut handlers = Vec::with_capacity(5);
        for signal in [SIGCHLD, SIGINT, SIGTERM] {
            handlers.push(low_level::pipe::register(signal, notify.try_clone()?)?);
        }
        for signal in TERMINATE {
            handlers.push(flag::register(signal, Arc::clone(&terminate))?);
        }
        Ok(Self {
            wake,
            terminate,
            handlers,
        })
    }

    /// Descriptor that becomes readable when a signal arrived.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.wake.as_fd()
    }

    /// Empties the wake-up pipe, returning how many notifications were queued.
    pub fn drain(&self) -> usize {
        let mut total = 0;
        let mut buf = [0u8; 64];
        loop {
            match (&self.wake).read(&mut buf) {
                Ok(0) => return total,
                Ok(count) => total += count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return total,
            }
        }
    }

    /// True once SIGINT or SIGTERM was received or [`SignalWatch::request_terminate`] called.
    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    /// Asks the event loop to shut down at its next iteration.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }
}

impl Drop for SignalWatch {
    fn drop(&mut self) {
        for id in self.handlers.drain(..) {
            low_level::unregister(id);
        }
    }
}

/// Collects exited login programs.
///
/// Every session's own child is polled without blocking; children of other
/// owners in the process are left alone. With `close_on_child_exit` a
/// session whose child exited is flagged dead and torn down at the top of
/// the next scan; otherwise it keeps relaying until its terminal hangs up.
/// Returns the number of children reaped.
pub fn reap_sessions(registry: &mut Registry, close_on_child_exit: bool) -> usize {
    let mut reaped = 0;
    for (key, session) in registry.iter_mut() {
        if let Some(status) = session.reap_child() {
            reaped += 1;
            info!(session_id = %session.id(), %status, "Login program exited");
            if close_on_child_exit {
                debug!(%key, "session flagged for teardown");
                session.mark_dead();
            }
        }
    }
    reaped
}

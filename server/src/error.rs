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

//! Error types for the relay daemon

use nix::errno::Errno;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Relay daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    /// I/O error on a socket, terminal or file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A system call failed
    #[error("System call failed: {0}")]
    Sys(#[from] Errno),

    /// No pseudo-terminal could be allocated
    #[error("No pseudo-terminal available: {0}")]
    PtyUnavailable(#[source] Errno),

    /// The login program could not be started
    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        /// Program that was being started
        program: PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// The configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A descriptor handed over by inetd is unusable
    #[error("Inherited descriptor unusable: {0}")]
    InheritedDescriptor(String),
}

impl DaemonError {
    /// Check if the error is transient
    ///
    /// Transient errors clear up on their own; the operation that raised them
    /// is simply retried with the same arguments.
    pub fn is_transient(&self) -> bool {
        match self {
            DaemonError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            DaemonError::Sys(errno) => matches!(errno, Errno::EINTR | Errno::EAGAIN | Errno::ENOMEM),
            _ => false,
        }
    }

    /// Check if the error means the system ran out of something
    ///
    /// These abandon the connection being set up while other sessions keep running.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            DaemonError::PtyUnavailable(_) | DaemonError::Spawn { .. } => true,
            DaemonError::Sys(errno) => is_exhausted(*errno),
            DaemonError::Io(err) => err.raw_os_error().is_some_and(|code| is_exhausted(Errno::from_raw(code))),
            _ => false,
        }
    }
}

fn is_exhausted(errno: Errno) -> bool {
    matches!(
        errno,
        Errno::EMFILE | Errno::ENFILE | Errno::ENOMEM | Errno::EAGAIN | Errno::ENOSPC | Errno::ENOBUFS
    )
}

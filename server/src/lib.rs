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

//! # Telnetd Server
//!
//! A single-process Telnet daemon. Every client gets a pseudo-terminal with
//! the login program attached to its slave side, and one event loop relays
//! bytes between each client and its terminal while stripping and escaping
//! Telnet commands in the stream.
//!
//! # Architecture
//!
//! ```text
//! Daemon (poll loop)
//!     ├── AdmissionControl
//!     ├── SignalWatch → reap_sessions
//!     └── Registry
//!           └── Session ── Peer (socket)
//!                 ├── pty master ── login program
//!                 └── RingBuffer ×2 + IacFilter / IacDoubler
//! ```
//!
//! # Example
//!
//! ```no_run
//! use telnetd_server::{Daemon, DaemonConfig};
//!
//! fn main() -> Result<(), telnetd_server::DaemonError> {
//!     let config = DaemonConfig::new("0.0.0.0:2323".parse().unwrap())
//!         .with_login_program("/bin/login")
//!         .with_max_sessions(4);
//!     let mut daemon = Daemon::new(config)?;
//!     daemon.run()
//! }
//! ```

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod accounting;
mod admission;
mod banner;
mod config;
mod daemon;
mod error;
pub mod logging;
mod metrics;
mod peer;
mod pty;
mod reaper;
mod registry;
mod session;
mod spawn;

pub use accounting::Accounting;
pub use admission::AdmissionControl;
pub use banner::{HostInfo, load_issue, render_issue};
pub use config::{Arguments, DaemonConfig, KeepaliveConfig, Mode, TELNET_PORT};
pub use daemon::{Daemon, Turn};
pub use error::{DaemonError, Result};
pub use metrics::{DaemonMetrics, MetricsSnapshot};
pub use peer::Peer;
pub use pty::{Pty, set_window_size};
pub use reaper::{SignalWatch, reap_sessions};
pub use registry::{Registry, SessionKey};
pub use session::{CloseReason, Session, SessionId, Transfers};
pub use spawn::spawn_login;

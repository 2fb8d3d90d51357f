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

//! Log output setup

use crate::config::{DaemonConfig, Mode};
use crate::{DaemonError, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error
    Stderr,
    /// Appended to a file
    File(PathBuf),
    /// Nowhere
    Discard,
}

impl LogTarget {
    /// Chooses the destination for `config`.
    ///
    /// Under inetd stderr usually is the client connection, so without an
    /// explicit log file nothing is written.
    pub fn for_config(config: &DaemonConfig) -> Self {
        match (&config.log_file, config.mode) {
            (Some(path), _) => LogTarget::File(path.clone()),
            (None, Mode::Inetd | Mode::InetdWait { .. }) => LogTarget::Discard,
            (None, Mode::Standalone) => LogTarget::Stderr,
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init(config: &DaemonConfig) -> Result<()> {
    let writer = match LogTarget::for_config(config) {
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogTarget::Discard => BoxMakeWriter::new(std::io::sink),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };
    let ansi = LogTarget::for_config(config) == LogTarget::Stderr;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init()
        .map_err(|err| DaemonError::InvalidConfig(format!("logging already initialized: {err}")))
}

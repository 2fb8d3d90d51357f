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

//! Best-effort utmp session records
//!
//! Only glibc Linux keeps a utmpx database we write to; elsewhere the records
//! are silently skipped.

use std::net::SocketAddr;
use tracing::trace;

/// Session accounting sink
#[derive(Debug, Clone, Copy)]
pub struct Accounting {
    enabled: bool,
}

impl Accounting {
    /// Creates an accounting sink, disabled when `enabled` is false.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// True when records are written.
    pub fn is_enabled(self) -> bool {
        self.enabled
    }

    /// Records a login process waiting on terminal `line`.
    pub fn login(self, pid: u32, line: &str, host: Option<SocketAddr>) {
        if self.enabled {
            trace!(pid, line, "utmp login record");
            let host = host.map(|addr| addr.ip().to_string()).unwrap_or_default();
            sys::write_record(sys::Kind::Login, pid, line, &host);
        }
    }

    /// Marks the record for terminal `line` as dead.
    pub fn logout(self, pid: u32, line: &str) {
        if self.enabled {
            trace!(pid, line, "utmp logout record");
            sys::write_record(sys::Kind::Dead, pid, line, "");
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod sys {
    use nix::libc;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(super) enum Kind {
        Login,
        Dead,
    }

    fn fill(dst: &mut [libc::c_char], src: &[u8]) {
        for (slot, byte) in dst.iter_mut().zip(src) {
            *slot = *byte as libc::c_char;
        }
    }

    /// Entry id: the last four bytes of the line name.
    pub(super) fn entry_id(line: &str) -> &[u8] {
        let bytes = line.as_bytes();
        &bytes[bytes.len().saturating_sub(4)..]
    }

    pub(super) fn write_record(kind: Kind, pid: u32, line: &str, host: &str) {
        // SAFETY: utmpx is plain old data; all-zero is a valid empty record.
        let mut entry: libc::utmpx = unsafe { std::mem::zeroed() };
        entry.ut_type = match kind {
            Kind::Login => libc::LOGIN_PROCESS,
            Kind::Dead => libc::DEAD_PROCESS,
        };
        entry.ut_pid = libc::pid_t::try_from(pid).unwrap_or_default();
        fill(&mut entry.ut_line, line.as_bytes());
        fill(&mut entry.ut_id, entry_id(line));
        if let Kind::Login = kind {
            fill(&mut entry.ut_user, b"LOGIN");
        }
        fill(&mut entry.ut_host, host.as_bytes());
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        entry.ut_tv.tv_sec = now.as_secs() as _;
        entry.ut_tv.tv_usec = now.subsec_micros() as _;

        // SAFETY: the utmpx functions are only called from the event loop thread.
        unsafe {
            libc::setutxent();
            libc::pututxline(&entry);
            libc::endutxent();
        }
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
mod sys {
    pub(super) enum Kind {
        Login,
        Dead,
    }

    pub(super) fn write_record(_kind: Kind, _pid: u32, _line: &str, _host: &str) {}
}

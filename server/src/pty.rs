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

//! Pseudo-terminal allocation

use crate::{DaemonError, Result};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::pty::{PtyMaster, Winsize, grantpt, posix_openpt, unlockpt};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use telnetd_codec::WindowSize;

/// A freshly allocated master/slave pair
///
/// The master is non-blocking and close-on-exec. The slave is only named here;
/// [`Pty::open_slave`] opens it for the child.
#[derive(Debug)]
pub struct Pty {
    master: File,
    slave_path: PathBuf,
}

impl Pty {
    /// Allocates a pseudo-terminal.
    pub fn open() -> Result<Self> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(DaemonError::PtyUnavailable)?;
        grantpt(&master).map_err(DaemonError::PtyUnavailable)?;
        unlockpt(&master).map_err(DaemonError::PtyUnavailable)?;
        let slave_path = slave_name(&master).map_err(DaemonError::PtyUnavailable)?;

        // SAFETY: the descriptor was just released by PtyMaster and is owned by nothing else.
        let master = unsafe { File::from_raw_fd(master.into_raw_fd()) };
        set_nonblocking_cloexec(&master)?;
        Ok(Self {
            master,
            slave_path: PathBuf::from(slave_path),
        })
    }

    /// Path of the slave device, e.g. `/dev/pts/3`.
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Terminal line name as recorded in utmp, e.g. `pts/3`.
    pub fn line(&self) -> &str {
        line_name(&self.slave_path)
    }

    /// Opens the slave side without making it a controlling terminal.
    pub fn open_slave(&self) -> Result<File> {
        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(&self.slave_path)?;
        Ok(slave)
    }

    /// The master side.
    pub fn master(&self) -> &File {
        &self.master
    }

    /// Splits into the master descriptor and the slave path.
    pub fn into_parts(self) -> (File, PathBuf) {
        (self.master, self.slave_path)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn slave_name(master: &PtyMaster) -> nix::Result<String> {
    nix::pty::ptsname_r(master)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_name(master: &PtyMaster) -> nix::Result<String> {
    // SAFETY: only the event loop thread allocates terminals.
    unsafe { nix::pty::ptsname(master) }
}

/// Strips the `/dev/` prefix from a terminal path.
pub fn line_name(path: &Path) -> &str {
    let name = path.to_str().unwrap_or_default();
    name.strip_prefix("/dev/").unwrap_or(name)
}

/// Marks a descriptor non-blocking and close-on-exec.
pub fn set_nonblocking_cloexec(fd: &impl AsRawFd) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    fcntl(raw, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Applies a client's window size to the terminal behind `master`.
pub fn set_window_size(master: &impl AsRawFd, size: WindowSize) -> nix::Result<()> {
    let winsize = Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCSWINSZ reads one winsize from a valid pointer.
    let rc = unsafe { nix::libc::ioctl(master.as_raw_fd(), nix::libc::TIOCSWINSZ, &winsize) };
    Errno::result(rc).map(drop)
}

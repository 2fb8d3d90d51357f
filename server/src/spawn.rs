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

//! Starting the login program on a terminal
//!
//! The child side setup runs between fork and exec and therefore sticks to
//! async-signal-safe calls: it resets signal dispositions, becomes a session
//! leader with the terminal as its controlling tty, configures the line
//! discipline, prints the banner and lets `exec` take over. Any failure makes
//! the spawn fail; the parent cleans up.

use crate::{DaemonError, Result};
use nix::libc;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, instrument};

#[cfg(any(target_os = "linux", target_os = "android"))]
const TAB_EXPANSION: libc::tcflag_t = libc::TAB3;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const TAB_EXPANSION: libc::tcflag_t = 0;

/// Starts `program` with `slave` as its stdin, stdout, stderr and controlling terminal.
///
/// `banner` is written to the terminal by the child before `program` replaces it.
#[instrument(skip(slave, banner), fields(program = %program.display()))]
pub fn spawn_login(program: &Path, slave: File, banner: Vec<u8>) -> Result<Child> {
    let to_error = |source: io::Error| DaemonError::Spawn {
        program: program.to_path_buf(),
        source,
    };
    let stdin = slave.try_clone().map_err(to_error)?;
    let stdout = slave.try_clone().map_err(to_error)?;

    let mut command = Command::new(program);
    command
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(slave));

    // SAFETY: the hook only performs async-signal-safe system calls and
    // touches no memory shared with the parent besides the owned banner.
    unsafe {
        command.pre_exec(move || attach_terminal(&banner));
    }

    let child = command.spawn().map_err(to_error)?;
    debug!(pid = child.id(), "login program started");
    Ok(child)
}

/// Child side terminal setup, run after stdio points at the slave.
fn attach_terminal(banner: &[u8]) -> io::Result<()> {
    // SAFETY: plain system calls on the child's own descriptors.
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        check(libc::setsid())?;
        check(libc::ioctl(0, libc::TIOCSCTTY, 0))?;
        check(libc::tcsetpgrp(0, libc::getpid()))?;

        let mut termios: libc::termios = std::mem::zeroed();
        check(libc::tcgetattr(0, &mut termios))?;
        termios.c_lflag |= libc::ECHO;
        termios.c_oflag |= libc::ONLCR | TAB_EXPANSION;
        termios.c_iflag |= libc::ICRNL;
        termios.c_iflag &= !libc::IXOFF;
        check(libc::tcsetattr(0, libc::TCSANOW, &termios))?;
    }
    write_banner(banner)
}

fn write_banner(mut banner: &[u8]) -> io::Result<()> {
    while !banner.is_empty() {
        // SAFETY: writes from a valid slice to stdout.
        let written = unsafe { libc::write(1, banner.as_ptr().cast(), banner.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        banner = &banner[written.unsigned_abs()..];
    }
    Ok(())
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

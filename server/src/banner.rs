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

//! Pre-login banner rendering
//!
//! The issue file is expanded in the daemon before the login program is
//! started; the child only copies the finished bytes to its terminal.
//!
//! Recognized escapes, introduced by `\` or `%`:
//!
//! | Escape | Expands to |
//! |---|---|
//! | `s` | operating system name |
//! | `n`, `h` | host name |
//! | `r` | kernel release |
//! | `v` | kernel version |
//! | `m` | machine architecture |
//! | `D`, `o` | domain name |
//! | `d` | current date |
//! | `t` | current time |
//! | `l` | terminal line |
//!
//! Any other escaped character is printed as is.

use chrono::{DateTime, Local, TimeZone};
use std::path::Path;
use tracing::debug;

/// Identification of the running system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// Operating system name
    pub sysname: String,
    /// Host name
    pub nodename: String,
    /// Kernel release
    pub release: String,
    /// Kernel version
    pub version: String,
    /// Machine architecture
    pub machine: String,
    /// NIS domain name
    pub domainname: String,
}

impl HostInfo {
    /// Reads the current system identification; fields are empty if unavailable.
    pub fn current() -> Self {
        match nix::sys::utsname::uname() {
            Ok(uts) => Self {
                sysname: uts.sysname().to_string_lossy().into_owned(),
                nodename: uts.nodename().to_string_lossy().into_owned(),
                release: uts.release().to_string_lossy().into_owned(),
                version: uts.version().to_string_lossy().into_owned(),
                machine: uts.machine().to_string_lossy().into_owned(),
                domainname: domain_name(&uts),
            },
            Err(errno) => {
                debug!("uname failed: {}", errno);
                Self::default()
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn domain_name(uts: &nix::sys::utsname::UtsName) -> String {
    uts.domainname().to_string_lossy().into_owned()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn domain_name(_uts: &nix::sys::utsname::UtsName) -> String {
    String::new()
}

/// Reads and renders the issue file for a session on terminal `line`.
///
/// A missing or unreadable file yields only the leading line break.
pub fn load_issue(path: &Path, line: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(template) => render_issue(&template, &HostInfo::current(), line, &Local::now()),
        Err(err) => {
            debug!("issue file {} not shown: {}", path.display(), err);
            render_issue(&[], &HostInfo::default(), line, &Local::now())
        }
    }
}

/// Expands `template` into the bytes shown on the terminal.
///
/// Output starts with `\r\n`; every newline in the template is followed by a
/// carriage return so the banner renders before the terminal is configured.
pub fn render_issue<Tz>(template: &[u8], host: &HostInfo, line: &str, now: &DateTime<Tz>) -> Vec<u8>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = Vec::with_capacity(template.len() + 2);
    out.extend_from_slice(b"\r\n");

    let mut bytes = template.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            b'\n' => out.extend_from_slice(b"\n\r"),
            b'\\' | b'%' => {
                let Some(escape) = bytes.next() else {
                    break;
                };
                match escape {
                    b's' => out.extend_from_slice(host.sysname.as_bytes()),
                    b'n' | b'h' => out.extend_from_slice(host.nodename.as_bytes()),
                    b'r' => out.extend_from_slice(host.release.as_bytes()),
                    b'v' => out.extend_from_slice(host.version.as_bytes()),
                    b'm' => out.extend_from_slice(host.machine.as_bytes()),
                    b'D' | b'o' => out.extend_from_slice(host.domainname.as_bytes()),
                    b'd' => out.extend_from_slice(now.format("%A, %d %B %Y").to_string().as_bytes()),
                    b't' => out.extend_from_slice(now.format("%H:%M:%S").to_string().as_bytes()),
                    b'l' => out.extend_from_slice(line.as_bytes()),
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn host() -> HostInfo {
        HostInfo {
            sysname: "Linux".into(),
            nodename: "router".into(),
            release: "6.1.0".into(),
            version: "#1 SMP".into(),
            machine: "mips".into(),
            domainname: "lan".into(),
        }
    }

    fn render(template: &str) -> String {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        String::from_utf8(render_issue(template.as_bytes(), &host(), "pts/2", &now)).unwrap()
    }

    #[test]
    fn test_empty_template_is_line_break() {
        assert_eq!(render(""), "\r\n");
    }

    #[test]
    fn test_newlines_gain_carriage_return() {
        assert_eq!(render("one\ntwo\n"), "\r\none\n\rtwo\n\r");
    }

    #[test]
    fn test_system_escapes() {
        assert_eq!(render("\\s \\r \\m"), "\r\nLinux 6.1.0 mips");
        assert_eq!(render("%n %h \\v"), "\r\nrouter router #1 SMP");
        assert_eq!(render("\\D.%o"), "\r\nlan.lan");
        assert_eq!(render("on \\l"), "\r\non pts/2");
    }

    #[test]
    fn test_date_and_time() {
        assert_eq!(render("\\d"), "\r\nTuesday, 05 March 2024");
        assert_eq!(render("%t"), "\r\n14:07:09");
    }

    #[test]
    fn test_unknown_escape_is_literal() {
        assert_eq!(render("100\\% \\\\ %x"), "\r\n100% \\ x");
    }

    #[test]
    fn test_trailing_escape_is_dropped() {
        assert_eq!(render("end\\"), "\r\nend");
    }

    #[test]
    fn test_missing_file() {
        let out = load_issue(Path::new("/nonexistent/issue.net"), "pts/0");
        assert_eq!(out, b"\r\n");
    }
}

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

//! Daemon configuration and command line parsing

use crate::{DaemonError, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Standard Telnet port
pub const TELNET_PORT: u16 = 23;

/// Telnet daemon serving login sessions on pseudo-terminals
///
/// Every option can also be supplied through a `TELNETD_*` environment variable.
#[derive(Debug, Parser)]
#[command(name = "telnetd", version, about, long_about = None)]
pub struct Arguments {
    /// Program to run for each session
    #[arg(
        short = 'l',
        long = "login",
        env = "TELNETD_LOGIN",
        default_value = "/bin/login"
    )]
    pub login_program: PathBuf,

    /// File displayed before the login prompt
    #[arg(
        short = 'f',
        long = "issue",
        env = "TELNETD_ISSUE",
        default_value = "/etc/issue.net"
    )]
    pub issue_file: PathBuf,

    /// Close the connection as soon as the login program exits
    #[arg(
        short = 'K',
        long = "close-on-exit",
        env = "TELNETD_CLOSE_ON_EXIT"
    )]
    pub close_on_exit: bool,

    /// Port to listen on
    #[arg(
        short = 'p',
        long = "port",
        env = "TELNETD_PORT",
        default_value_t = TELNET_PORT
    )]
    pub port: u16,

    /// Address to bind to
    #[arg(
        short = 'b',
        long = "bind",
        env = "TELNETD_BIND",
        value_name = "ADDR[:PORT]"
    )]
    pub bind: Option<String>,

    /// Run in the foreground
    #[arg(
        short = 'F',
        long = "foreground",
        env = "TELNETD_FOREGROUND"
    )]
    pub foreground: bool,

    /// Serve one connection already open on stdin/stdout
    #[arg(
        short = 'i',
        long = "inetd",
        env = "TELNETD_INETD",
        conflicts_with = "wait"
    )]
    pub inetd: bool,

    /// Inetd wait mode: listen on stdin, exit after SEC idle seconds
    #[arg(
        short = 'w',
        long = "wait",
        env = "TELNETD_WAIT",
        value_name = "SEC"
    )]
    pub wait: Option<u64>,

    /// Maximum number of concurrent sessions
    #[arg(
        long = "max-sessions",
        env = "TELNETD_MAX_SESSIONS",
        default_value_t = 1
    )]
    pub max_sessions: usize,

    /// Do not record sessions in utmp
    #[arg(long = "no-utmp", env = "TELNETD_NO_UTMP")]
    pub no_utmp: bool,

    /// Append log output to this file instead of stderr
    #[arg(
        long = "log-file",
        env = "TELNETD_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,
}

/// How connections reach the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bind and accept on our own listening socket
    Standalone,
    /// A single connection is already open on stdin and stdout
    Inetd,
    /// The listening socket is stdin; exit once idle for `linger`
    InetdWait {
        /// Idle time with no sessions before the process exits
        linger: Duration,
    },
}

impl Mode {
    /// True when the daemon owns a listening socket.
    pub fn has_listener(self) -> bool {
        !matches!(self, Mode::Inetd)
    }

    /// Linger applied while no session is live, if any.
    pub fn linger(self) -> Option<Duration> {
        match self {
            Mode::InetdWait { linger } => Some(linger),
            _ => None,
        }
    }
}

/// TCP keep-alive tuning applied to accepted connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Idle time before the first probe
    pub idle: Duration,
    /// Time between unanswered probes
    pub interval: Duration,
    /// Unanswered probes before the peer is declared dead
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        // A dead peer is noticed after about two minutes.
        Self {
            idle: Duration::from_secs(60),
            interval: Duration::from_secs(10),
            count: 6,
        }
    }
}

/// Daemon configuration
///
/// Use the builder methods to customize the defaults.
///
/// # Example
///
/// ```
/// use telnetd_server::{DaemonConfig, Mode};
///
/// let config = DaemonConfig::default()
///     .with_login_program("/bin/sh")
///     .with_max_sessions(8)
///     .with_mode(Mode::Standalone);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Program started on the terminal of every session
    pub login_program: PathBuf,

    /// Issue file rendered before the login program starts
    pub issue_file: PathBuf,

    /// Tear a session down as soon as its child exits
    ///
    /// When unset, output still queued for the client is flushed first.
    pub close_on_child_exit: bool,

    /// Address of the listening socket in standalone mode
    pub bind_address: SocketAddr,

    /// Stay attached to the controlling terminal
    pub foreground: bool,

    /// Where connections come from
    pub mode: Mode,

    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Keep-alive tuning for accepted sockets
    pub keepalive: KeepaliveConfig,

    /// Record sessions in utmp
    pub accounting: bool,

    /// Log destination; stderr when unset
    pub log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            login_program: PathBuf::from("/bin/login"),
            issue_file: PathBuf::from("/etc/issue.net"),
            close_on_child_exit: false,
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), TELNET_PORT),
            foreground: false,
            mode: Mode::Standalone,
            max_sessions: 1,
            keepalive: KeepaliveConfig::default(),
            accounting: true,
            log_file: None,
        }
    }
}

impl DaemonConfig {
    /// Create a new configuration listening on the given address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the login program
    pub fn with_login_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.login_program = program.into();
        self
    }

    /// Set the issue file
    pub fn with_issue_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.issue_file = path.into();
        self
    }

    /// Close sessions as soon as their child exits
    pub fn with_close_on_child_exit(mut self, enabled: bool) -> Self {
        self.close_on_child_exit = enabled;
        self
    }

    /// Set the listening address
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Stay in the foreground
    pub fn with_foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }

    /// Set the operating mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the maximum number of concurrent sessions
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the keep-alive tuning
    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Enable or disable utmp accounting
    pub fn with_accounting(mut self, enabled: bool) -> Self {
        self.accounting = enabled;
        self
    }

    /// Log to a file instead of stderr
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be greater than 0".to_string());
        }

        if self.login_program.as_os_str().is_empty() {
            return Err("login_program must not be empty".to_string());
        }

        if self.keepalive.idle.as_secs() == 0 || self.keepalive.interval.as_secs() == 0 {
            return Err("keepalive idle and interval must be at least one second".to_string());
        }

        if self.keepalive.count == 0 {
            return Err("keepalive count must be greater than 0".to_string());
        }

        if let Mode::InetdWait { linger } = self.mode {
            if linger.is_zero() {
                return Err("wait linger must be greater than 0".to_string());
            }
        }

        Ok(())
    }
}

impl TryFrom<Arguments> for DaemonConfig {
    type Error = DaemonError;

    fn try_from(args: Arguments) -> Result<Self> {
        let bind_address = match &args.bind {
            Some(value) => parse_bind_address(value, args.port)?,
            None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port),
        };

        let mode = match (args.inetd, args.wait) {
            (true, Some(_)) => {
                return Err(DaemonError::InvalidConfig(
                    "--inetd and --wait are mutually exclusive".to_string(),
                ));
            }
            (true, None) => Mode::Inetd,
            (false, Some(secs)) => Mode::InetdWait {
                linger: Duration::from_secs(secs),
            },
            (false, None) => Mode::Standalone,
        };

        let config = DaemonConfig {
            login_program: args.login_program,
            issue_file: args.issue_file,
            close_on_child_exit: args.close_on_exit,
            bind_address,
            // Only a standalone daemon detaches.
            foreground: args.foreground || mode != Mode::Standalone,
            mode,
            max_sessions: args.max_sessions,
            keepalive: KeepaliveConfig::default(),
            accounting: !args.no_utmp,
            log_file: args.log_file,
        };
        config.validate().map_err(DaemonError::InvalidConfig)?;
        Ok(config)
    }
}

/// Parses `ADDR` or `ADDR:PORT`; a bare address takes `default_port`.
fn parse_bind_address(value: &str, default_port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let host = value.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| DaemonError::InvalidConfig(format!("invalid bind address '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Arguments {
        Arguments::try_parse_from(std::iter::once("telnetd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.login_program, PathBuf::from("/bin/login"));
        assert_eq!(config.issue_file, PathBuf::from("/etc/issue.net"));
        assert_eq!(config.bind_address.port(), 23);
        assert_eq!(config.max_sessions, 1);
        assert_eq!(config.mode, Mode::Standalone);
        assert!(config.accounting);
        assert!(!config.close_on_child_exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DaemonConfig::default()
            .with_login_program("/bin/sh")
            .with_max_sessions(4)
            .with_close_on_child_exit(true)
            .with_accounting(false);

        assert_eq!(config.login_program, PathBuf::from("/bin/sh"));
        assert_eq!(config.max_sessions, 4);
        assert!(config.close_on_child_exit);
        assert!(!config.accounting);
    }

    #[test]
    fn test_validation() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());

        config.max_sessions = 0;
        assert!(config.validate().is_err());

        config.max_sessions = 1;
        config.mode = Mode::InetdWait {
            linger: Duration::ZERO,
        };
        assert!(config.validate().is_err());

        config.mode = Mode::Standalone;
        config.keepalive.count = 0;
        assert!(config.validate().is_err());
    }

    // ============================================================================
    // Command Line
    // ============================================================================

    #[test]
    fn test_arguments_defaults() {
        let config = DaemonConfig::try_from(parse(&[])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:23".parse().unwrap());
        assert_eq!(config.mode, Mode::Standalone);
        assert!(!config.foreground);
    }

    #[test]
    fn test_arguments_port_and_bind() {
        let config = DaemonConfig::try_from(parse(&["-p", "2323"])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:2323".parse().unwrap());

        let config = DaemonConfig::try_from(parse(&["-p", "2323", "-b", "127.0.0.1"])).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:2323".parse().unwrap());

        // An explicit port in the bind address wins over -p.
        let config = DaemonConfig::try_from(parse(&["-p", "2323", "-b", "127.0.0.1:9000"])).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000".parse().unwrap());

        let config = DaemonConfig::try_from(parse(&["-b", "[::1]"])).unwrap();
        assert_eq!(config.bind_address, "[::1]:23".parse().unwrap());
    }

    #[test]
    fn test_arguments_invalid_bind() {
        let err = DaemonConfig::try_from(parse(&["-b", "not-an-address"])).unwrap_err();
        assert!(matches!(err, DaemonError::InvalidConfig(_)));
    }

    #[test]
    fn test_arguments_inetd_modes() {
        let config = DaemonConfig::try_from(parse(&["-i"])).unwrap();
        assert_eq!(config.mode, Mode::Inetd);
        assert!(!config.mode.has_listener());

        let config = DaemonConfig::try_from(parse(&["-w", "30"])).unwrap();
        assert_eq!(
            config.mode,
            Mode::InetdWait {
                linger: Duration::from_secs(30)
            }
        );
        assert!(config.foreground);
        assert_eq!(config.mode.linger(), Some(Duration::from_secs(30)));

        assert!(Arguments::try_parse_from(["telnetd", "-i", "-w", "5"]).is_err());
    }

    #[test]
    fn test_arguments_flags() {
        let config = DaemonConfig::try_from(parse(&[
            "-K",
            "-F",
            "-l",
            "/bin/sh",
            "-f",
            "/dev/null",
            "--max-sessions",
            "3",
            "--no-utmp",
        ]))
        .unwrap();
        assert!(config.close_on_child_exit);
        assert!(config.foreground);
        assert_eq!(config.login_program, PathBuf::from("/bin/sh"));
        assert_eq!(config.issue_file, PathBuf::from("/dev/null"));
        assert_eq!(config.max_sessions, 3);
        assert!(!config.accounting);
    }

    #[test]
    fn test_arguments_reject_zero_sessions() {
        let err = DaemonConfig::try_from(parse(&["--max-sessions", "0"])).unwrap_err();
        assert!(matches!(err, DaemonError::InvalidConfig(_)));
    }
}

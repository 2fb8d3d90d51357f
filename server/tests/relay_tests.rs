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

//! End-to-end relay tests driving the daemon loop against real TCP clients

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};
use telnetd_codec::PREAMBLE;
use telnetd_server::{Daemon, DaemonConfig, Mode, Peer, Turn};

const STEP: Duration = Duration::from_millis(20);
const PATIENCE: Duration = Duration::from_secs(5);

fn config() -> DaemonConfig {
    DaemonConfig::new("127.0.0.1:0".parse().unwrap())
        .with_login_program("/bin/cat")
        .with_issue_file("/nonexistent/issue.net")
        .with_accounting(false)
}

fn connect(daemon: &Daemon) -> TcpStream {
    let client = TcpStream::connect(daemon.local_addr().unwrap()).unwrap();
    client.set_read_timeout(Some(Duration::from_millis(5))).unwrap();
    client
}

/// Turns the daemon and collects what the client receives until `done`
/// holds or the client sees end of stream.
fn pump<F>(daemon: &mut Daemon, client: &mut TcpStream, received: &mut Vec<u8>, done: F) -> bool
where
    F: Fn(&[u8]) -> bool,
{
    let start = Instant::now();
    let mut buf = [0u8; 512];
    while start.elapsed() < PATIENCE {
        if done(received) {
            return true;
        }
        assert_eq!(daemon.turn(Some(STEP)).unwrap(), Turn::Continue);
        match client.read(&mut buf) {
            Ok(0) => return done(received),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) if err.kind() == ErrorKind::ConnectionReset => return done(received),
            Err(err) => panic!("client read failed: {err}"),
        }
    }
    done(received)
}

fn turn_until<F>(daemon: &mut Daemon, done: F) -> bool
where
    F: Fn(&Daemon) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < PATIENCE {
        if done(daemon) {
            return true;
        }
        daemon.turn(Some(STEP)).unwrap();
    }
    done(daemon)
}

/// Preamble and banner have both arrived.
fn greeted(bytes: &[u8]) -> bool {
    bytes.len() > PREAMBLE.len() && bytes[PREAMBLE.len()..].contains(&b'\n')
}

fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|window| *window == needle).count()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    occurrences(haystack, needle) > 0
}

fn client_closed(client: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    let start = Instant::now();
    while start.elapsed() < PATIENCE {
        match client.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::ConnectionReset => return true,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => panic!("client read failed: {err}"),
        }
    }
    false
}

// ============================================================================
// Session Startup
// ============================================================================

#[test]
fn test_preamble_then_banner() {
    let mut daemon = Daemon::new(config()).unwrap();
    let mut client = connect(&daemon);
    let mut received = Vec::new();

    assert!(pump(&mut daemon, &mut client, &mut received, greeted));
    assert_eq!(&received[..PREAMBLE.len()], PREAMBLE);
    // An empty banner: a line break, passed through the terminal's output processing.
    assert_eq!(received[PREAMBLE.len()], b'\r');

    let snapshot = daemon.metrics().snapshot();
    assert_eq!(snapshot.total_sessions, 1);
    assert_eq!(snapshot.active_sessions, 1);
    assert_eq!(daemon.registry().len(), 1);
}

#[test]
fn test_line_reaches_login_program() {
    let mut daemon = Daemon::new(config()).unwrap();
    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, greeted));
    received.clear();

    client.write_all(b"ls\r\n").unwrap();
    // Terminal echo plus cat's copy of the line.
    assert!(pump(&mut daemon, &mut client, &mut received, |bytes| occurrences(bytes, b"ls") >= 2));
    assert!(contains(&received, b"ls\r\n"));
    assert!(daemon.metrics().snapshot().bytes_from_network >= 4);
}

#[test]
fn test_negotiation_is_stripped() {
    let mut daemon = Daemon::new(config()).unwrap();
    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, greeted));
    received.clear();

    // DO ECHO, a window size report, then plain text.
    client.write_all(&[255, 253, 1]).unwrap();
    client.write_all(&[255, 250, 31, 0, 80, 0, 24, 255, 240]).unwrap();
    client.write_all(b"hi\r").unwrap();
    assert!(pump(&mut daemon, &mut client, &mut received, |bytes| occurrences(bytes, b"hi") >= 2));
    // Nothing of the commands reached the terminal to be echoed.
    assert!(!received.contains(&b'^'));
    assert!(!received.contains(&b'P'));
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_connection_over_capacity_is_closed() {
    let mut daemon = Daemon::new(config().with_max_sessions(1)).unwrap();
    let mut first = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut first, &mut received, |bytes| {
        bytes.len() >= PREAMBLE.len()
    }));

    let mut second = connect(&daemon);
    assert!(turn_until(&mut daemon, |daemon| daemon.metrics().snapshot().rejected_sessions == 1));
    assert!(client_closed(&mut second));
    assert_eq!(daemon.registry().len(), 1);

    // The first session still relays.
    received.clear();
    first.write_all(b"ok\r").unwrap();
    assert!(pump(&mut daemon, &mut first, &mut received, |bytes| contains(bytes, b"ok")));
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_peer_disconnect_ends_session() {
    let mut daemon = Daemon::new(config()).unwrap();
    let idle_max_fd = daemon.registry().max_fd();
    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, |bytes| {
        bytes.len() >= PREAMBLE.len()
    }));
    assert!(daemon.registry().max_fd() > idle_max_fd);

    drop(client);
    assert!(turn_until(&mut daemon, |daemon| daemon.registry().is_empty()));
    assert_eq!(daemon.registry().max_fd(), idle_max_fd);

    let snapshot = daemon.metrics().snapshot();
    assert_eq!(snapshot.total_sessions, 1);
    assert_eq!(snapshot.active_sessions, 0);
}

#[test]
fn test_child_exit_with_close_on_exit() {
    let mut daemon = Daemon::new(config().with_close_on_child_exit(true)).unwrap();
    let idle_max_fd = daemon.registry().max_fd();
    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, |bytes| {
        bytes.len() >= PREAMBLE.len()
    }));

    let pid = daemon
        .registry()
        .iter()
        .find_map(|(_, session)| session.child_pid())
        .unwrap();
    kill(Pid::from_raw(i32::try_from(pid).unwrap()), Signal::SIGKILL).unwrap();

    assert!(turn_until(&mut daemon, |daemon| daemon.registry().is_empty()));
    assert_eq!(daemon.registry().max_fd(), idle_max_fd);
    assert!(client_closed(&mut client));
}

#[test]
fn test_child_exit_without_close_on_exit_drains() {
    let mut daemon = Daemon::new(config()).unwrap();
    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, |bytes| {
        bytes.len() >= PREAMBLE.len()
    }));

    let pid = daemon
        .registry()
        .iter()
        .find_map(|(_, session)| session.child_pid())
        .unwrap();
    kill(Pid::from_raw(i32::try_from(pid).unwrap()), Signal::SIGKILL).unwrap();

    // The terminal hangs up once the last slave holder is gone.
    assert!(turn_until(&mut daemon, |daemon| daemon.registry().is_empty()));
    assert!(client_closed(&mut client));
}

#[test]
fn test_shutdown_closes_every_session() {
    let mut daemon = Daemon::new(config()).unwrap();
    let mut clients: Vec<TcpStream> = (0..3).map(|_| connect(&daemon)).collect();
    assert!(turn_until(&mut daemon, |daemon| daemon.registry().len() == 3));

    daemon.request_shutdown();
    assert_eq!(daemon.turn(Some(STEP)).unwrap(), Turn::Exit);
    assert!(daemon.registry().is_empty());
    for client in &mut clients {
        assert!(client_closed(client));
    }
}

// ============================================================================
// Inetd Modes
// ============================================================================

#[test]
fn test_wait_mode_exits_after_linger() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let linger = Duration::from_millis(300);
    let mut daemon = Daemon::with_listener(config().with_mode(Mode::InetdWait { linger }), listener).unwrap();

    let start = Instant::now();
    while daemon.turn(None).unwrap() == Turn::Continue {
        assert!(start.elapsed() < PATIENCE, "linger never expired");
    }
    assert!(start.elapsed() >= linger);
    assert_eq!(daemon.metrics().snapshot().total_sessions, 0);
}

#[test]
fn test_wait_mode_serves_before_lingering() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let linger = Duration::from_millis(300);
    let mut daemon = Daemon::with_listener(config().with_mode(Mode::InetdWait { linger }), listener).unwrap();

    let mut client = connect(&daemon);
    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, greeted));
    drop(client);

    let start = Instant::now();
    while daemon.turn(Some(STEP)).unwrap() == Turn::Continue {
        assert!(start.elapsed() < PATIENCE, "wait mode never exited");
    }
    assert!(daemon.registry().is_empty());
    assert_eq!(daemon.metrics().snapshot().total_sessions, 1);
}

#[test]
fn test_inetd_session_ends_daemon() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    client.set_read_timeout(Some(Duration::from_millis(5))).unwrap();
    let (accepted, _) = listener.accept().unwrap();
    let input = OwnedFd::from(accepted.try_clone().unwrap());
    let peer = Peer::from_split(input, OwnedFd::from(accepted));

    let mut daemon = Daemon::with_peer(config().with_mode(Mode::Inetd), peer).unwrap();
    assert!(daemon.local_addr().is_none());
    assert_eq!(daemon.registry().len(), 1);

    let mut received = Vec::new();
    assert!(pump(&mut daemon, &mut client, &mut received, greeted));
    assert_eq!(&received[..PREAMBLE.len()], PREAMBLE);

    drop(client);
    let start = Instant::now();
    while daemon.turn(Some(STEP)).unwrap() == Turn::Continue {
        assert!(start.elapsed() < PATIENCE, "inetd session never ended");
    }
    assert!(daemon.registry().is_empty());
}

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

//! Daemon counters
//!
//! Every update is kept in a local counter block, for the shutdown summary and
//! for tests, and forwarded to the `metrics` facade under the `telnetd.*`
//! names so an embedding process can install any recorder it likes.

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Daemon metrics
#[derive(Debug)]
pub struct DaemonMetrics {
    // Session counts
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    rejected_sessions: AtomicU64,

    // Throughput
    bytes_from_network: AtomicU64,
    bytes_to_network: AtomicU64,

    // Failures
    spawn_failures: AtomicU64,
    accept_failures: AtomicU64,
    exhausted_setups: AtomicU64,

    total_session_duration_ns: AtomicU64,
    started_at: Instant,
}

impl Default for DaemonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            rejected_sessions: AtomicU64::new(0),
            bytes_from_network: AtomicU64::new(0),
            bytes_to_network: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            accept_failures: AtomicU64::new(0),
            exhausted_setups: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a session being opened
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("telnetd.sessions.opened").increment(1);
        gauge!("telnetd.sessions.active").increment(1.0);
    }

    /// Record a session being closed after `duration`
    pub fn session_closed(&self, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.total_session_duration_ns.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        counter!("telnetd.sessions.closed").increment(1);
        gauge!("telnetd.sessions.active").decrement(1.0);
        histogram!("telnetd.sessions.duration").record(duration.as_secs_f64());
    }

    /// Record a connection turned away at capacity
    pub fn session_rejected(&self) {
        self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("telnetd.sessions.rejected").increment(1);
    }

    /// Get the current number of active sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record bytes read from a client
    pub fn bytes_from_network(&self, count: usize) {
        let count = count as u64;
        self.bytes_from_network.fetch_add(count, Ordering::Relaxed);
        counter!("telnetd.bytes.from_network").increment(count);
    }

    /// Record source bytes delivered to a client
    pub fn bytes_to_network(&self, count: usize) {
        let count = count as u64;
        self.bytes_to_network.fetch_add(count, Ordering::Relaxed);
        counter!("telnetd.bytes.to_network").increment(count);
    }

    // Failure tracking

    /// Record a login program that could not be started
    pub fn spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
        counter!("telnetd.spawn.failures").increment(1);
    }

    /// Record a failed accept
    pub fn accept_failure(&self) {
        self.accept_failures.fetch_add(1, Ordering::Relaxed);
        counter!("telnetd.accept.failures").increment(1);
    }

    /// Record a connection dropped because the system ran out of ptys,
    /// processes or descriptors
    pub fn resource_exhausted(&self) {
        self.exhausted_setups.fetch_add(1, Ordering::Relaxed);
        counter!("telnetd.resources.exhausted").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            rejected_sessions: self.rejected_sessions.load(Ordering::Relaxed),
            bytes_from_network: self.bytes_from_network.load(Ordering::Relaxed),
            bytes_to_network: self.bytes_to_network.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            accept_failures: self.accept_failures.load(Ordering::Relaxed),
            exhausted_setups: self.exhausted_setups.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let closed = self.total_sessions.load(Ordering::Relaxed) - self.active_sessions.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of daemon metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Sessions opened since start
    pub total_sessions: u64,
    /// Sessions currently live
    pub active_sessions: u64,
    /// Connections turned away at capacity
    pub rejected_sessions: u64,
    /// Bytes read from clients
    pub bytes_from_network: u64,
    /// Terminal bytes delivered to clients, before IAC doubling
    pub bytes_to_network: u64,
    /// Login programs that failed to start
    pub spawn_failures: u64,
    /// Failed accepts
    pub accept_failures: u64,
    /// Connections dropped for lack of system resources
    pub exhausted_setups: u64,
    /// Time since the daemon started
    pub uptime: Duration,
    /// Average lifetime of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Total failure count
    pub fn total_failures(&self) -> u64 {
        self.spawn_failures + self.accept_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tracking() {
        let metrics = DaemonMetrics::new();
        assert_eq!(metrics.active_sessions(), 0);

        metrics.session_opened();
        metrics.session_opened();
        assert_eq!(metrics.active_sessions(), 2);
        assert_eq!(metrics.total_sessions(), 2);

        metrics.session_closed(Duration::from_secs(10));
        assert_eq!(metrics.active_sessions(), 1);
        assert_eq!(metrics.total_sessions(), 2);
        assert_eq!(metrics.snapshot().avg_session_duration, Duration::from_secs(10));
    }

    #[test]
    fn test_throughput_and_failures() {
        let metrics = DaemonMetrics::new();
        metrics.bytes_from_network(4);
        metrics.bytes_to_network(12);
        metrics.session_rejected();
        metrics.spawn_failure();
        metrics.accept_failure();
        metrics.resource_exhausted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_from_network, 4);
        assert_eq!(snapshot.bytes_to_network, 12);
        assert_eq!(snapshot.rejected_sessions, 1);
        assert_eq!(snapshot.total_failures(), 2);
        assert_eq!(snapshot.exhausted_setups, 1);
    }

    #[test]
    fn test_average_without_closed_sessions() {
        let metrics = DaemonMetrics::new();
        metrics.session_opened();
        assert_eq!(metrics.snapshot().avg_session_duration, Duration::ZERO);
    }
}

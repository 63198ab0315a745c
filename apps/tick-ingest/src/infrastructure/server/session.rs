//! Connection Sessions
//!
//! Per-connection state owned exclusively by that connection's task, plus
//! the shared connection counters the server exposes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crate::domain::tick::ConnectionId;
use crate::infrastructure::metrics;
use crate::infrastructure::server::framer::LineFramer;

/// State for one accepted TCP connection.
///
/// Owned exclusively by the connection's task; no other task reads or
/// mutates it.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    accepted_at: Instant,
    messages: u64,
    /// Partial-line buffer; discarded with the session.
    pub framer: LineFramer,
}

impl ConnectionSession {
    /// Create a session for a freshly accepted connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            accepted_at: Instant::now(),
            messages: 0,
            framer: LineFramer::new(),
        }
    }

    /// The session's identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Count one extracted record.
    pub const fn record_received(&mut self) {
        self.messages += 1;
    }

    /// Records extracted on this connection so far.
    #[must_use]
    pub const fn messages(&self) -> u64 {
        self.messages
    }

    /// Time since the connection was accepted.
    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        self.accepted_at.elapsed()
    }
}

impl Default for ConnectionSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection counters shared between the server and its observers.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    active: AtomicUsize,
    accepted: AtomicU64,
}

impl ConnectionStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently open connections.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Connections accepted since startup.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Count an accepted connection and return a guard whose drop closes
    /// it out. Going through a guard makes teardown idempotent: however
    /// many close signals a connection produces, the decrement happens
    /// exactly once.
    #[must_use]
    pub fn open(self: Arc<Self>) -> ActiveConnectionGuard {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_connection_accepted();
        metrics::set_active_connections(active);
        ActiveConnectionGuard { stats: self }
    }
}

/// Drop guard for one open connection.
#[derive(Debug)]
pub struct ActiveConnectionGuard {
    stats: Arc<ConnectionStats>,
}

impl Drop for ActiveConnectionGuard {
    fn drop(&mut self) {
        let active = self.stats.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_counts_records() {
        let mut session = ConnectionSession::new();
        session.record_received();
        session.record_received();
        assert_eq!(session.messages(), 2);
    }

    #[test]
    fn stats_track_active_and_accepted() {
        let stats = Arc::new(ConnectionStats::new());
        let first = Arc::clone(&stats).open();
        let second = Arc::clone(&stats).open();
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.accepted(), 2);

        drop(first);
        assert_eq!(stats.active(), 1);
        drop(second);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.accepted(), 2);
    }
}

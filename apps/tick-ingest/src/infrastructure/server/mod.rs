//! TCP Connection Manager
//!
//! Accepts inbound tick connections, assigns each a session, and drives a
//! read loop per connection that frames the byte stream into records and
//! hands them to the ingest pipeline.
//!
//! Failure semantics: a bind failure at startup is fatal; post-bind accept
//! errors restart the listener after a fixed delay, retried indefinitely;
//! per-connection errors tear down only that connection. Back-pressure is
//! the OS socket buffer: a slow pipeline stalls the one connection awaiting
//! it, never its neighbors.

mod framer;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub use framer::LineFramer;
pub use session::{ActiveConnectionGuard, ConnectionSession, ConnectionStats};

use crate::application::services::IngestPipeline;
use crate::domain::tick::RawRecord;
use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::metrics;

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener bind address, `host:port`.
    pub bind_addr: String,
    /// Soft cap on concurrently open connections.
    pub max_connections: usize,
    /// Inactivity window after which a connection is closed.
    pub idle_timeout: Duration,
    /// Delay before restarting the listener after a post-bind error.
    pub listener_retry_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(ServerSettings::default())
    }
}

impl From<ServerSettings> for ServerConfig {
    fn from(settings: ServerSettings) -> Self {
        Self {
            bind_addr: settings.bind_addr(),
            max_connections: settings.max_connections,
            idle_timeout: settings.idle_timeout,
            listener_retry_delay: settings.listener_retry_delay,
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen socket could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying socket error.
        source: std::io::Error,
    },
}

/// The TCP connection manager.
///
/// Bind first with [`bind`](Self::bind) (a bind failure is a startup
/// failure), then drive with [`run`](Self::run) on a spawned task.
pub struct IngestServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    pipeline: Arc<IngestPipeline>,
    stats: Arc<ConnectionStats>,
    cancel: CancellationToken,
}

impl IngestServer {
    /// Bind the listen socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address cannot be bound;
    /// callers treat this as fatal.
    pub async fn bind(
        config: ServerConfig,
        pipeline: Arc<IngestPipeline>,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;

        Ok(Self {
            config,
            listener,
            local_addr,
            pipeline,
            stats: Arc::new(ConnectionStats::new()),
            cancel,
        })
    }

    /// The address the listener actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared connection counters.
    #[must_use]
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until shutdown is requested.
    pub async fn run(mut self) {
        tracing::info!(addr = %self.local_addr, "listening for tick connections");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("stopped accepting connections");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed, restarting listener");
                        if !self.restart_listener().await {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Start the per-connection task for an accepted socket.
    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = Arc::clone(&self.stats).open();
        let active = self.stats.active();
        if active > self.config.max_connections {
            metrics::record_connection_cap_exceeded();
            tracing::warn!(
                active,
                cap = self.config.max_connections,
                "connection cap exceeded, serving anyway"
            );
        }

        // Favor latency over throughput on the hot inbound path.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to disable nagle");
        }

        let pipeline = Arc::clone(&self.pipeline);
        let idle_timeout = self.config.idle_timeout;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, pipeline, idle_timeout, cancel).await;
            drop(guard);
        });
    }

    /// Rebind the listen socket after a post-bind failure, retrying forever.
    ///
    /// Returns `false` when shutdown was requested while waiting.
    async fn restart_listener(&mut self) -> bool {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = tokio::time::sleep(self.config.listener_retry_delay) => {}
            }

            match TcpListener::bind(&self.config.bind_addr).await {
                Ok(listener) => {
                    if let Ok(addr) = listener.local_addr() {
                        self.local_addr = addr;
                    }
                    self.listener = listener;
                    tracing::info!(addr = %self.local_addr, "listener restarted");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        addr = %self.config.bind_addr,
                        error = %e,
                        "listener restart failed, retrying"
                    );
                }
            }
        }
    }
}

/// Read loop for one connection.
///
/// Runs until the peer closes, the socket errors, the idle window elapses,
/// or shutdown is requested. Each complete record is processed inline, so
/// per-connection arrival order is preserved end to end.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    pipeline: Arc<IngestPipeline>,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut session = ConnectionSession::new();
    tracing::info!(connection = %session.id(), %peer, "connection accepted");

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(connection = %session.id(), "closing for shutdown");
                break;
            }
            read = tokio::time::timeout(idle_timeout, stream.read(&mut buf)) => read,
        };

        match read {
            Err(_elapsed) => {
                tracing::warn!(
                    connection = %session.id(),
                    idle_secs = idle_timeout.as_secs(),
                    "idle timeout, closing connection"
                );
                break;
            }
            Ok(Ok(0)) => {
                tracing::debug!(connection = %session.id(), "closed by peer");
                break;
            }
            Ok(Ok(n)) => {
                for line in session.framer.push(&buf[..n]) {
                    session.record_received();
                    let raw = RawRecord {
                        connection_id: session.id(),
                        received_at_ms: Utc::now().timestamp_millis(),
                        line,
                    };
                    // A slow pipeline stalls only this connection.
                    let _ = pipeline.process(raw).await;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(connection = %session.id(), error = %e, "read failed");
                break;
            }
        }
    }

    if session.framer.buffered() > 0 {
        tracing::debug!(
            connection = %session.id(),
            bytes = session.framer.buffered(),
            "discarding partial line at close"
        );
    }
    tracing::info!(
        connection = %session.id(),
        messages = session.messages(),
        uptime_secs = session.uptime().as_secs(),
        "connection closed"
    );
}

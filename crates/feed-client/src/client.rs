//! Feed Client Connection Machine
//!
//! Owns the outbound TCP connection lifecycle: connect, flush the queue,
//! pump live records, and on failure schedule a reconnect with jittered
//! exponential backoff until the attempt cap is exhausted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use feed_wire::{BackoffConfig, BackoffPolicy, PriceTick, encode};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::queue::OutboundQueue;

/// Errors surfaced by the client's run loop.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// The reconnect attempt cap was reached without re-establishing the
    /// connection; the client has stopped retrying.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectAttemptsExhausted {
        /// Attempts consumed before giving up.
        attempts: u32,
    },
}

/// Connection state of the client, observable through
/// [`FeedClientHandle::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// No connection and no connect attempt in flight.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The connection is established; records are written as they arrive.
    Connected,
    /// Shutdown requested; finishing the in-flight write.
    Draining,
}

impl ClientState {
    /// Short state label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Draining => "draining",
        }
    }
}

/// Lifecycle events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection established.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Reconnect scheduled.
    Reconnecting {
        /// Reconnect attempt number.
        attempt: u32,
    },
    /// Queued records were replayed after a reconnect.
    QueueFlushed {
        /// Number of records flushed.
        count: usize,
    },
    /// The reconnect attempt cap was exhausted; the client stopped.
    GaveUp {
        /// Attempts consumed before giving up.
        attempts: u32,
    },
}

/// Configuration for the client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Target address, `host:port`.
    pub addr: String,
    /// Reconnect backoff policy. `max_attempts` of 0 retries forever.
    pub backoff: BackoffConfig,
    /// Bound on the final flush when draining on shutdown.
    pub drain_timeout: Duration,
}

impl FeedClientConfig {
    /// Configuration for `addr` with default backoff and drain bounds.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            backoff: BackoffConfig::capped(10),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Caller-facing handle: non-blocking sends plus state/backlog observation.
#[derive(Debug, Clone)]
pub struct FeedClientHandle {
    record_tx: mpsc::UnboundedSender<String>,
    state_rx: watch::Receiver<ClientState>,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl FeedClientHandle {
    /// Hand a tick to the client.
    ///
    /// Never blocks and never fails from the caller's point of view: when
    /// the transport is down the encoded record joins the outbound queue.
    /// Records sent after the client has terminally stopped are dropped
    /// with a warning.
    pub fn send(&self, tick: &PriceTick) {
        let line = encode(tick);
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.record_tx.send(line).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            tracing::warn!(
                instrument = %tick.instrument,
                "record dropped, feed client is stopped"
            );
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Watch channel over connection-state changes.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    /// Records accepted by [`send`](Self::send) but not yet written to a
    /// socket.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Request a drain-and-stop of the client's run loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// Shutdown was requested; the run loop should exit cleanly.
    Cancelled,
    /// All handles are gone; nothing more will ever be sent.
    IntakeClosed,
    /// The socket failed; the run loop should reconnect.
    Failed(std::io::Error),
}

/// The client's connection task.
///
/// Create with [`FeedClient::new`], then drive with [`run`](Self::run) on a
/// spawned task. Interact through the returned [`FeedClientHandle`].
pub struct FeedClient {
    config: FeedClientConfig,
    record_rx: mpsc::UnboundedReceiver<String>,
    queue: OutboundQueue,
    state_tx: watch::Sender<ClientState>,
    event_tx: mpsc::Sender<ClientEvent>,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a client and its handle.
    ///
    /// Lifecycle events are delivered to `event_tx`; `cancel` requests a
    /// drain-and-stop (the handle's [`stop`](FeedClientHandle::stop) cancels
    /// the same token).
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<ClientEvent>,
        cancel: CancellationToken,
    ) -> (Self, FeedClientHandle) {
        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = FeedClientHandle {
            record_tx,
            state_rx,
            pending: Arc::clone(&pending),
            cancel: cancel.clone(),
        };

        let client = Self {
            config,
            record_rx,
            queue: OutboundQueue::new(),
            state_tx,
            event_tx,
            pending,
            cancel,
        };

        (client, handle)
    }

    /// Run the connection loop until stopped, the intake closes, or the
    /// reconnect cap is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::ReconnectAttemptsExhausted`] once the
    /// configured attempt cap is reached; this is the operator-visible
    /// terminal condition.
    pub async fn run(mut self) -> Result<(), FeedClientError> {
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(ClientState::Disconnected);
                return Ok(());
            }

            self.set_state(ClientState::Connecting);
            tracing::debug!(addr = %self.config.addr, "connecting");

            match TcpStream::connect(&self.config.addr).await {
                Ok(stream) => {
                    backoff.reset();
                    match self.connected_session(stream).await {
                        SessionEnd::Cancelled => {
                            self.set_state(ClientState::Disconnected);
                            return Ok(());
                        }
                        SessionEnd::IntakeClosed => {
                            tracing::debug!("all client handles dropped, stopping");
                            self.set_state(ClientState::Disconnected);
                            return Ok(());
                        }
                        SessionEnd::Failed(e) => {
                            tracing::warn!(error = %e, "connection lost");
                            let _ = self.event_tx.send(ClientEvent::Disconnected).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(addr = %self.config.addr, error = %e, "connect failed");
                }
            }

            self.set_state(ClientState::Disconnected);

            if let Some(delay) = backoff.next_delay() {
                let attempt = backoff.attempt_count();
                tracing::info!(attempt, delay_ms = delay.as_millis(), "reconnect scheduled");
                let _ = self
                    .event_tx
                    .send(ClientEvent::Reconnecting { attempt })
                    .await;

                if !self.wait_for_reconnect(delay).await {
                    self.set_state(ClientState::Disconnected);
                    return Ok(());
                }
            } else {
                let attempts = backoff.attempt_count();
                tracing::error!(
                    addr = %self.config.addr,
                    attempts,
                    queued = self.queue.len(),
                    "reconnect attempts exhausted, giving up"
                );
                let _ = self.event_tx.send(ClientEvent::GaveUp { attempts }).await;
                return Err(FeedClientError::ReconnectAttemptsExhausted { attempts });
            }
        }
    }

    /// Drive one established connection: replay the queue, then pump live
    /// records until failure or shutdown.
    async fn connected_session(&mut self, mut stream: TcpStream) -> SessionEnd {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to disable nagle");
        }

        self.set_state(ClientState::Connected);
        tracing::info!(addr = %self.config.addr, "connected");
        let _ = self.event_tx.send(ClientEvent::Connected).await;

        let queued = self.queue.len();
        if queued > 0 {
            if let Err(e) = self.flush_queue(&mut stream).await {
                return SessionEnd::Failed(e);
            }
            tracing::info!(count = queued, "outbound queue replayed");
            let _ = self
                .event_tx
                .send(ClientEvent::QueueFlushed { count: queued })
                .await;
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.drain(&mut stream).await;
                    return SessionEnd::Cancelled;
                }
                record = self.record_rx.recv() => match record {
                    Some(line) => {
                        if let Err(e) = write_record(&mut stream, &line).await {
                            // The record was handed to a dying socket; with no
                            // application-level acknowledgment it cannot be
                            // re-queued, so it is counted as gone.
                            self.pending.fetch_sub(1, Ordering::Relaxed);
                            return SessionEnd::Failed(e);
                        }
                        self.pending.fetch_sub(1, Ordering::Relaxed);
                    }
                    None => return SessionEnd::IntakeClosed,
                }
            }
        }
    }

    /// Replay queued records strictly in FIFO order.
    ///
    /// On a write error the record being written is lost, the rest stay
    /// queued for the next connection.
    async fn flush_queue(&mut self, stream: &mut TcpStream) -> std::io::Result<()> {
        while let Some(line) = self.queue.pop() {
            let written = write_record(stream, &line).await;
            self.pending.fetch_sub(1, Ordering::Relaxed);
            written?;
        }
        Ok(())
    }

    /// Bounded final flush after a shutdown request.
    async fn drain(&mut self, stream: &mut TcpStream) {
        self.set_state(ClientState::Draining);
        let flush = async {
            let _ = stream.flush().await;
            let _ = stream.shutdown().await;
        };
        if tokio::time::timeout(self.config.drain_timeout, flush)
            .await
            .is_err()
        {
            tracing::warn!("drain timed out before the final write completed");
        }
    }

    /// Sleep out the backoff delay, queuing any records that arrive in the
    /// meantime. Returns `false` when shutdown was requested.
    async fn wait_for_reconnect(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = tokio::time::sleep_until(deadline) => return true,
                record = self.record_rx.recv() => match record {
                    Some(line) => self.queue.push(line),
                    None => {
                        // Intake closed; still honor the delay so queued
                        // records get one more delivery attempt.
                        tokio::select! {
                            () = self.cancel.cancelled() => return false,
                            () = tokio::time::sleep_until(deadline) => return true,
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ClientState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::debug!(from = current.as_str(), to = state.as_str(), "state change");
                *current = state;
                true
            }
        });
    }
}

async fn write_record(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels() {
        assert_eq!(ClientState::Disconnected.as_str(), "disconnected");
        assert_eq!(ClientState::Connecting.as_str(), "connecting");
        assert_eq!(ClientState::Connected.as_str(), "connected");
        assert_eq!(ClientState::Draining.as_str(), "draining");
    }

    #[test]
    fn default_config_caps_reconnects() {
        let config = FeedClientConfig::new("127.0.0.1:9000");
        assert_eq!(config.backoff.max_attempts, 10);
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
    }
}

//! Tick Log Transport
//!
//! TCP connection to the downstream tick-log broker. One envelope per
//! line; when acknowledgments are enabled the broker answers one `ok` line
//! per record. The transport drops its connection on any failure so the
//! caller's next attempt starts with a fresh connect.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// Acknowledgment level requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckLevel {
    /// Fire and forget: a flushed write counts as delivered.
    None,
    /// Wait for the leader's acknowledgment.
    #[default]
    Leader,
    /// Wait for full replication.
    All,
}

impl AckLevel {
    /// Parse an acknowledgment level, defaulting to leader.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" | "0" => Self::None,
            "all" | "-1" => Self::All,
            _ => Self::Leader,
        }
    }

    /// Level name as carried in the record envelope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Leader => "leader",
            Self::All => "all",
        }
    }

    /// Whether a send waits for a broker reply.
    #[must_use]
    pub const fn awaits_reply(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No connection is established.
    #[error("not connected to any broker")]
    NotConnected,

    /// Socket-level failure.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Every configured broker refused the connection.
    #[error("no broker reachable (tried {attempted}): {last_error}")]
    NoBrokerReachable {
        /// Brokers attempted.
        attempted: usize,
        /// The final connect failure.
        last_error: String,
    },

    /// The broker answered something other than an acknowledgment.
    #[error("broker rejected the record: {reply}")]
    Rejected {
        /// The broker's reply line.
        reply: String,
    },

    /// The broker closed the connection mid-exchange.
    #[error("broker closed the connection")]
    ConnectionClosed,
}

/// TCP transport to the tick-log broker.
#[derive(Debug)]
pub struct TickLogTransport {
    brokers: Vec<String>,
    acks: AckLevel,
    stream: Option<BufStream<TcpStream>>,
}

impl TickLogTransport {
    /// Create a disconnected transport over a broker list.
    #[must_use]
    pub const fn new(brokers: Vec<String>, acks: AckLevel) -> Self {
        Self {
            brokers,
            acks,
            stream: None,
        }
    }

    /// Whether a connection is currently established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect to the first reachable broker, tried in configured order.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoBrokerReachable`] when every broker
    /// refuses the connection.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let mut last_error = "no brokers configured".to_string();

        for broker in &self.brokers {
            match TcpStream::connect(broker).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "failed to disable nagle");
                    }
                    tracing::info!(%broker, "tick log broker connected");
                    self.stream = Some(BufStream::new(stream));
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(%broker, error = %e, "broker connect failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(TransportError::NoBrokerReachable {
            attempted: self.brokers.len(),
            last_error,
        })
    }

    /// Send one envelope line, awaiting the broker's reply when the
    /// acknowledgment level requires one.
    ///
    /// # Errors
    ///
    /// Any failure drops the connection before surfacing, so the next
    /// attempt reconnects from scratch.
    pub async fn send(&mut self, envelope: &str) -> Result<(), TransportError> {
        let result = self.try_send(envelope).await;
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    async fn try_send(&mut self, envelope: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        stream.write_all(envelope.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        if self.acks.awaits_reply() {
            let mut reply = String::new();
            let read = stream.read_line(&mut reply).await?;
            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            let reply = reply.trim();
            if !reply.eq_ignore_ascii_case("ok") {
                return Err(TransportError::Rejected {
                    reply: reply.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Drop the connection without touching the socket further.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// Flush and close the connection.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush().await;
            let _ = stream.get_mut().shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("none", AckLevel::None)]
    #[test_case("0", AckLevel::None)]
    #[test_case("leader", AckLevel::Leader)]
    #[test_case("1", AckLevel::Leader)]
    #[test_case("all", AckLevel::All; "lowercase all")]
    #[test_case("-1", AckLevel::All)]
    #[test_case("ALL", AckLevel::All; "uppercase all")]
    #[test_case("unknown", AckLevel::Leader)]
    fn ack_level_parsing(input: &str, expected: AckLevel) {
        assert_eq!(AckLevel::from_str_case_insensitive(input), expected);
    }

    #[test]
    fn only_none_skips_the_reply() {
        assert!(!AckLevel::None.awaits_reply());
        assert!(AckLevel::Leader.awaits_reply());
        assert!(AckLevel::All.awaits_reply());
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let mut transport = TickLogTransport::new(vec![], AckLevel::None);
        assert!(matches!(
            transport.send("{}").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_with_no_reachable_broker_fails() {
        // A reserved-then-released port refuses connections.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap().to_string();
        drop(probe);

        let mut transport = TickLogTransport::new(vec![addr], AckLevel::Leader);
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::NoBrokerReachable { attempted: 1, .. })
        ));
    }
}

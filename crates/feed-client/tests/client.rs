//! Integration tests for the reconnecting transport client.
//!
//! The peer in these tests is a plain tokio TCP listener; assertions happen
//! at the wire boundary (lines received, in order), since the protocol has
//! no application-level acknowledgments.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use feed_client::{ClientEvent, ClientState, FeedClient, FeedClientConfig};
use feed_wire::{BackoffConfig, PriceTick};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn tick(n: i64) -> PriceTick {
    PriceTick::new("AAPL.O".to_string(), Decimal::new(n, 0), 1_705_323_000_000 + n)
}

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts,
    }
}

/// Reserve a local port by binding and immediately releasing it.
fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let port = listener.local_addr().expect("probe addr").port();
    drop(listener);
    port
}

async fn read_lines(listener: TcpListener, count: usize) -> Vec<String> {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut reader = BufReader::new(stream).lines();
    let mut lines = Vec::with_capacity(count);
    while lines.len() < count {
        match reader.next_line().await.expect("read line") {
            Some(line) => lines.push(line),
            None => break,
        }
    }
    lines
}

#[tokio::test]
async fn queued_records_replay_in_order_on_reconnect() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let port = reserve_port();
        let mut config = FeedClientConfig::new(format!("127.0.0.1:{port}"));
        config.backoff = fast_backoff(0);

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let (client, handle) = FeedClient::new(config, event_tx, cancel);
        let run = tokio::spawn(client.run());

        // Nothing is listening yet: these must queue, not error.
        for n in 1..=5 {
            handle.send(&tick(n));
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_ne!(handle.state(), ClientState::Connected);
        assert_eq!(handle.pending_records(), 5);

        // Bring the server up; the client reconnects and replays the queue.
        let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("bind");
        let lines = read_lines(listener, 5).await;

        let expected: Vec<String> = (1..=5).map(|n| feed_wire::encode(&tick(n))).collect();
        assert_eq!(lines, expected);

        handle.stop();
        run.await.expect("join").expect("clean stop");
        assert_eq!(handle.pending_records(), 0);

        let mut saw_flush = false;
        let mut saw_reconnecting = false;
        while let Ok(event) = event_rx.try_recv() {
            match event {
                ClientEvent::QueueFlushed { count } => {
                    saw_flush = true;
                    assert_eq!(count, 5);
                }
                ClientEvent::Reconnecting { .. } => saw_reconnecting = true,
                _ => {}
            }
        }
        assert!(saw_flush, "expected a QueueFlushed event");
        assert!(saw_reconnecting, "expected at least one Reconnecting event");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn live_records_are_written_in_send_order() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let reader = tokio::spawn(read_lines(listener, 3));

        let mut config = FeedClientConfig::new(addr.to_string());
        config.backoff = fast_backoff(0);

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let (client, handle) = FeedClient::new(config, event_tx, cancel);
        let run = tokio::spawn(client.run());

        // Wait for the connection before sending live records.
        loop {
            match event_rx.recv().await {
                Some(ClientEvent::Connected) => break,
                Some(_) => {}
                None => panic!("event channel closed before connect"),
            }
        }
        assert_eq!(handle.state(), ClientState::Connected);

        for n in 10..13 {
            handle.send(&tick(n));
        }
        while handle.pending_records() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        handle.stop();
        run.await.expect("join").expect("clean stop");

        let lines = reader.await.expect("reader join");
        let expected: Vec<String> = (10..13).map(|n| feed_wire::encode(&tick(n))).collect();
        assert_eq!(lines, expected);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn exhausted_reconnect_cap_is_terminal_and_visible() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        // Reserved-then-released port: connects are refused.
        let port = reserve_port();
        let mut config = FeedClientConfig::new(format!("127.0.0.1:{port}"));
        config.backoff = fast_backoff(2);

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let (client, handle) = FeedClient::new(config, event_tx, cancel);

        handle.send(&tick(1));

        let result = client.run().await;
        match result {
            Err(feed_client::FeedClientError::ReconnectAttemptsExhausted { attempts }) => {
                assert_eq!(attempts, 2);
            }
            other => panic!("expected terminal failure, got {other:?}"),
        }
        assert_eq!(handle.state(), ClientState::Disconnected);

        let mut saw_gave_up = false;
        while let Ok(event) = event_rx.try_recv() {
            if let ClientEvent::GaveUp { attempts } = event {
                saw_gave_up = true;
                assert_eq!(attempts, 2);
            }
        }
        assert!(saw_gave_up, "expected a GaveUp event");
    })
    .await
    .expect("test timed out");
}

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::default_trait_access)
)]

//! Feed Client - Reliable Transport Client
//!
//! Producer-side TCP client for the tick wire protocol. Callers hand ticks
//! to a non-blocking [`FeedClientHandle::send`]; a background task owns the
//! connection lifecycle:
//!
//! ```text
//! Disconnected ──start/reconnect──► Connecting ──established──► Connected
//!      ▲                                │                          │
//!      └────────── backoff ◄────────────┴──── socket error ◄───────┘
//! ```
//!
//! While disconnected, records accumulate in an unbounded FIFO queue and are
//! replayed in order once the connection is re-established. Reconnect
//! attempts follow a jittered exponential backoff with a configurable cap;
//! once the cap is exhausted the client stops retrying and surfaces a
//! terminal failure.
//!
//! The wire protocol carries no application-level acknowledgment, so a
//! record already written to a socket that later turns out to be dead is
//! not re-queued: delivery is at-most-once per attempt, best effort.

mod client;
mod queue;

pub use client::{
    ClientEvent, ClientState, FeedClient, FeedClientConfig, FeedClientError, FeedClientHandle,
};
pub use queue::OutboundQueue;

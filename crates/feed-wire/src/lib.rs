#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access
    )
)]

//! Feed Wire - Shared Tick Wire Protocol
//!
//! The wire protocol spoken on both sides of the tick pipeline: the
//! producer-side transport client encodes ticks with this crate, and the
//! ingest service decodes them with it. One record is one newline-terminated
//! line of six `|`-delimited fields:
//!
//! ```text
//! INSTRUMENT|PRICE|TIMESTAMP_MS|VOLUME|BID|ASK
//! ```
//!
//! Optional fields (volume, bid, ask) serialize as empty fields when absent:
//!
//! ```text
//! AAPL.O|150.60|1705323000000|1000000|150.10|150.75
//! EUR=|1.0850|1705323002000|||
//! ```
//!
//! The codec checks shape and type only; business rules (ranges, spread
//! consistency, price anomalies) belong to the receiver's validation layer.
//!
//! The crate also carries the jittered exponential backoff policy shared by
//! the client's reconnect loop and the ingest service's publish retry loop.

/// Jittered exponential backoff policy.
pub mod backoff;

/// Line codec for the tick wire format.
pub mod codec;

/// The tick domain type carried by the wire format.
pub mod tick;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use codec::{DecodeError, FIELD_COUNT, FIELD_DELIMITER, decode, encode};
pub use tick::PriceTick;

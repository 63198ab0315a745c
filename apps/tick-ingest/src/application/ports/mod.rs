//! Port Interfaces
//!
//! The pipeline's outbound contract. The production adapter is the tick-log
//! publisher in the infrastructure layer; tests substitute recording or
//! failing doubles.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::tick::EnrichedTick;

/// Publish failures, split so callers can branch on failure category.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// The record could not be serialized. Permanent: retrying cannot help.
    #[error("record serialization failed: {0}")]
    Serialization(String),

    /// One delivery attempt exceeded its bounded timeout.
    #[error("delivery attempt timed out after {timeout:?}")]
    Timeout {
        /// The per-attempt bound that elapsed.
        timeout: Duration,
    },

    /// One delivery attempt failed in transit.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Every allowed attempt failed; the record was not delivered.
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final attempt's failure.
        last_error: String,
    },

    /// The publisher is shutting down and no longer accepts records.
    #[error("publisher is shut down")]
    ShutDown,
}

impl PublishError {
    /// Whether retrying the same record could ever succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::ShutDown)
    }
}

/// Outbound port: delivers enriched ticks to the durable tick log.
///
/// Implementations must preserve delivery order per instrument across
/// concurrent callers.
#[async_trait]
pub trait TickPublisher: Send + Sync {
    /// Deliver one enriched tick, retrying transient failures internally.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] once the record is known undeliverable:
    /// immediately for permanent failures, after the retry budget for
    /// transient ones.
    async fn publish(&self, tick: &EnrichedTick) -> Result<(), PublishError>;
}

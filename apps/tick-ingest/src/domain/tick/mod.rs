//! Record Types and Identifiers
//!
//! The shapes a price update takes on its way through the service: an
//! undecoded [`RawRecord`] straight off a connection, and the immutable
//! [`EnrichedTick`] handed to the publish pipeline once validation passed.

use feed_wire::PriceTick;
use serde::Serialize;
use uuid::Uuid;

/// Identifier of one accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One undecoded line off a connection plus its transport metadata.
///
/// Ephemeral: created per inbound line, discarded after decoding.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Connection the line arrived on.
    pub connection_id: ConnectionId,
    /// Receipt time in milliseconds since the Unix epoch, assigned by the
    /// receiver.
    pub received_at_ms: i64,
    /// The undecoded line, already trimmed by the framer.
    pub line: String,
}

/// Globally unique, strictly increasing sequence identifier.
///
/// The process-start epoch distinguishes restarts; the counter orders
/// records within one process lifetime. Ordering derives from the field
/// order, so identifiers compare correctly across both components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId {
    /// Process start time in milliseconds since the Unix epoch.
    pub epoch_ms: i64,
    /// Position within this process lifetime, starting at 1.
    pub seq: u64,
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:012}", self.epoch_ms, self.seq)
    }
}

impl Serialize for SequenceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of validating one record, carried on the published tick.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the record passed validation.
    pub passed: bool,
    /// Non-fatal findings, e.g. a price deviation flagged in permissive
    /// mode.
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// A pass with no findings.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            passed: true,
            warnings: Vec::new(),
        }
    }

    /// A pass with warnings attached.
    #[must_use]
    pub const fn passed_with_warnings(warnings: Vec<String>) -> Self {
        Self {
            passed: true,
            warnings,
        }
    }
}

/// A validated tick plus arrival metadata, sequence identifier, and
/// computed latency. Immutable once created; this is the record shape the
/// downstream tick log receives.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnrichedTick {
    /// The validated price update.
    #[serde(flatten)]
    pub tick: PriceTick,
    /// Receipt time in milliseconds since the Unix epoch.
    pub received_at_ms: i64,
    /// Connection the record arrived on.
    pub connection_id: ConnectionId,
    /// Globally unique, strictly increasing sequence identifier.
    pub sequence: SequenceId,
    /// Receipt time minus event time. May be negative under clock skew;
    /// reported as-is, never clamped.
    pub latency_ms: i64,
    /// Outcome of validation.
    pub validation: ValidationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ids_order_by_epoch_then_seq() {
        let a = SequenceId { epoch_ms: 1, seq: 9 };
        let b = SequenceId { epoch_ms: 2, seq: 1 };
        let c = SequenceId { epoch_ms: 2, seq: 2 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn sequence_id_serializes_as_string() {
        let id = SequenceId {
            epoch_ms: 1_705_323_000_000,
            seq: 42,
        };
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1705323000000-000000000042\"");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}

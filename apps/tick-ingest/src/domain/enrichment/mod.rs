//! Enrichment & Sequencing
//!
//! Stamps validated ticks with arrival metadata and a globally unique,
//! strictly increasing sequence identifier. No I/O and no failure modes;
//! a malformed input here would be a programming error upstream, not a
//! recoverable condition.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use feed_wire::PriceTick;

use crate::domain::tick::{EnrichedTick, RawRecord, SequenceId, ValidationOutcome};

/// Generator of strictly increasing sequence identifiers.
///
/// Process start time plus an atomically incremented counter: unique across
/// restarts without any cross-process coordination, ordered within one
/// process lifetime.
#[derive(Debug)]
pub struct Sequencer {
    epoch_ms: i64,
    counter: AtomicU64,
}

impl Sequencer {
    /// Create a sequencer anchored to the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_epoch(Utc::now().timestamp_millis())
    }

    /// Create a sequencer with a fixed epoch.
    #[must_use]
    pub const fn with_epoch(epoch_ms: i64) -> Self {
        Self {
            epoch_ms,
            counter: AtomicU64::new(0),
        }
    }

    /// Next identifier. Strictly increasing across all callers for the
    /// lifetime of this sequencer.
    pub fn next_id(&self) -> SequenceId {
        SequenceId {
            epoch_ms: self.epoch_ms,
            seq: self.counter.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Identifiers handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Attaches arrival metadata and sequence identifiers to validated ticks.
#[derive(Debug, Default)]
pub struct Enricher {
    sequencer: Sequencer,
}

impl Enricher {
    /// Create an enricher with a fresh sequencer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sequencer: Sequencer::new(),
        }
    }

    /// Create an enricher around an existing sequencer.
    #[must_use]
    pub const fn with_sequencer(sequencer: Sequencer) -> Self {
        Self { sequencer }
    }

    /// Produce the immutable enriched record for a validated tick.
    ///
    /// Latency is receipt time minus event time and may be negative under
    /// clock skew; it is reported, never clamped.
    pub fn enrich(
        &self,
        tick: PriceTick,
        raw: &RawRecord,
        validation: ValidationOutcome,
    ) -> EnrichedTick {
        let latency_ms = raw.received_at_ms - tick.event_ts_ms;
        EnrichedTick {
            tick,
            received_at_ms: raw.received_at_ms,
            connection_id: raw.connection_id,
            sequence: self.sequencer.next_id(),
            latency_ms,
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::tick::ConnectionId;

    fn raw(received_at_ms: i64) -> RawRecord {
        RawRecord {
            connection_id: ConnectionId::new(),
            received_at_ms,
            line: String::new(),
        }
    }

    fn tick(event_ts_ms: i64) -> PriceTick {
        PriceTick::new("AAPL.O".to_string(), Decimal::new(15_060, 2), event_ts_ms)
    }

    #[test]
    fn sequence_ids_increase_strictly() {
        let sequencer = Sequencer::with_epoch(1);
        let a = sequencer.next_id();
        let b = sequencer.next_id();
        let c = sequencer.next_id();
        assert!(a < b && b < c);
        assert_eq!(sequencer.issued(), 3);
    }

    #[test]
    fn sequence_ids_are_unique_across_threads() {
        let sequencer = Arc::new(Sequencer::with_epoch(1));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sequencer = Arc::clone(&sequencer);
            handles.push(std::thread::spawn(move || {
                (0..1_000).map(|_| sequencer.next_id()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<SequenceId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        let issued = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), issued, "sequence identifiers must be unique");
    }

    #[test]
    fn latency_is_receipt_minus_event() {
        let enricher = Enricher::with_sequencer(Sequencer::with_epoch(1));
        let enriched = enricher.enrich(tick(1_000), &raw(1_250), ValidationOutcome::clean());
        assert_eq!(enriched.latency_ms, 250);
    }

    #[test]
    fn negative_latency_is_reported_not_clamped() {
        let enricher = Enricher::with_sequencer(Sequencer::with_epoch(1));
        let enriched = enricher.enrich(tick(2_000), &raw(1_500), ValidationOutcome::clean());
        assert_eq!(enriched.latency_ms, -500);
    }

    #[test]
    fn enrichment_preserves_raw_metadata() {
        let enricher = Enricher::with_sequencer(Sequencer::with_epoch(7));
        let raw = raw(1_705_323_000_123);
        let enriched = enricher.enrich(tick(1_705_323_000_000), &raw, ValidationOutcome::clean());
        assert_eq!(enriched.connection_id, raw.connection_id);
        assert_eq!(enriched.received_at_ms, raw.received_at_ms);
        assert_eq!(enriched.sequence.epoch_ms, 7);
        assert_eq!(enriched.sequence.seq, 1);
        assert!(enriched.validation.passed);
    }
}

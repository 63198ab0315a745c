//! Tick Domain Type
//!
//! The canonical in-memory representation of one price update. Prices are
//! `rust_decimal::Decimal` so repeated encode/decode cycles and deviation
//! arithmetic stay exact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price update for a financial instrument.
///
/// Field semantics follow the wire format: `instrument` is a non-empty
/// identifier (uppercased on decode), `price` is the trade/mid price,
/// `event_ts_ms` is the producer-supplied event time in milliseconds since
/// the Unix epoch, and `volume`/`bid`/`ask` are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Instrument code, e.g. `AAPL.O` or `EUR=`.
    pub instrument: String,
    /// Price of the update.
    pub price: Decimal,
    /// Event timestamp in milliseconds since the Unix epoch.
    pub event_ts_ms: i64,
    /// Traded volume, if reported.
    pub volume: Option<Decimal>,
    /// Best bid, if reported.
    pub bid: Option<Decimal>,
    /// Best ask, if reported.
    pub ask: Option<Decimal>,
}

impl PriceTick {
    /// Create a tick with no optional fields.
    #[must_use]
    pub const fn new(instrument: String, price: Decimal, event_ts_ms: i64) -> Self {
        Self {
            instrument,
            price,
            event_ts_ms,
            volume: None,
            bid: None,
            ask: None,
        }
    }

    /// Attach a traded volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Attach a bid/ask pair.
    #[must_use]
    pub const fn with_quote(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn builder_sets_optional_fields() {
        let tick = PriceTick::new("AAPL.O".to_string(), Decimal::new(15_060, 2), 1_705_323_000_000)
            .with_volume(Decimal::new(1_000_000, 0))
            .with_quote(Decimal::new(15_010, 2), Decimal::new(15_075, 2));

        assert_eq!(tick.volume, Some(Decimal::new(1_000_000, 0)));
        assert_eq!(tick.bid, Some(Decimal::new(15_010, 2)));
        assert_eq!(tick.ask, Some(Decimal::new(15_075, 2)));
    }

    #[test]
    fn new_leaves_optional_fields_absent() {
        let tick = PriceTick::new("EUR=".to_string(), Decimal::new(10_850, 4), 1_705_323_002_000);
        assert!(tick.volume.is_none());
        assert!(tick.bid.is_none());
        assert!(tick.ask.is_none());
    }
}

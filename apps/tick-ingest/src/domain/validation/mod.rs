//! Validation Engine
//!
//! Turns one raw line into either a validated [`PriceTick`] or an ordered
//! list of named failures. Checks run in a fixed order:
//!
//! 1. Structural/type checks via the wire codec
//! 2. Range checks (price, event timestamp, optional fields)
//! 3. Cross-field checks (bid/ask spread consistency)
//! 4. Anomaly check against the last accepted price per instrument
//!
//! The engine holds the only cross-task shared mutable state in the
//! service: the last accepted price per instrument. The anomaly check and
//! the state update happen under one lock guard, so read-check-then-write
//! is atomic per instrument. Malformed input is an ordinary rejection
//! outcome, never a panic.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use feed_wire::{DecodeError, PriceTick};
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Validation policy: whether anomaly findings reject or merely warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Anomalies reject the record.
    Strict,
    /// Anomalies are warnings; the record is still accepted.
    #[default]
    Permissive,
}

impl ValidationMode {
    /// Parse a mode from a string, defaulting to permissive.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "strict" => Self::Strict,
            _ => Self::Permissive,
        }
    }

    /// Mode name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
        }
    }
}

/// Limits applied by the validation engine.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Anomaly policy.
    pub mode: ValidationMode,
    /// Maximum relative deviation from the last accepted price before a
    /// record is flagged (0.10 = 10%).
    pub max_deviation: Decimal,
    /// Maximum age of the event timestamp.
    pub max_timestamp_age: Duration,
    /// Allowance for event timestamps ahead of the receiver's clock.
    pub max_future_skew: Duration,
    /// Sanity ceiling for prices, bids, and asks.
    pub price_ceiling: Decimal,
    /// Sanity ceiling for traded volume.
    pub volume_ceiling: Decimal,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Permissive,
            max_deviation: Decimal::new(10, 2),
            max_timestamp_age: Duration::from_secs(300),
            max_future_skew: Duration::from_secs(60),
            price_ceiling: Decimal::new(1_000_000, 0),
            volume_ceiling: Decimal::new(1_000_000_000_000, 0),
        }
    }
}

/// One named validation failure. `Display` renders the human-readable
/// reason; [`category`](Self::category) is the stable label used for
/// per-reason counters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    /// The line failed structural decoding.
    #[error("malformed record: {0}")]
    Malformed(#[from] DecodeError),

    /// Price is zero or negative.
    #[error("price {price} is not positive")]
    NonPositivePrice {
        /// The offending price.
        price: Decimal,
    },

    /// Price exceeds the sanity ceiling.
    #[error("price {price} exceeds sanity ceiling {ceiling}")]
    PriceAboveCeiling {
        /// The offending price.
        price: Decimal,
        /// Configured ceiling.
        ceiling: Decimal,
    },

    /// The event timestamp is older than the allowed window.
    #[error("event timestamp is {age_secs}s old, maximum age is {max_secs}s")]
    StaleTimestamp {
        /// Observed age in seconds.
        age_secs: i64,
        /// Configured maximum age in seconds.
        max_secs: u64,
    },

    /// The event timestamp is too far ahead of the receiver's clock.
    #[error("event timestamp is {ahead_secs}s in the future, allowance is {max_secs}s")]
    FutureTimestamp {
        /// Seconds ahead of the receiver's clock.
        ahead_secs: i64,
        /// Configured skew allowance in seconds.
        max_secs: u64,
    },

    /// An optional numeric field is negative.
    #[error("{field} {value} is negative")]
    NegativeField {
        /// Field name.
        field: &'static str,
        /// The offending value.
        value: Decimal,
    },

    /// An optional numeric field exceeds its sanity ceiling.
    #[error("{field} {value} exceeds sanity ceiling {ceiling}")]
    FieldAboveCeiling {
        /// Field name.
        field: &'static str,
        /// The offending value.
        value: Decimal,
        /// Configured ceiling.
        ceiling: Decimal,
    },

    /// Bid and ask are both present but inverted.
    #[error("bid {bid} exceeds ask {ask}")]
    BidAboveAsk {
        /// The offending bid.
        bid: Decimal,
        /// The offending ask.
        ask: Decimal,
    },

    /// Price falls outside the reported bid/ask spread.
    #[error("price {price} outside spread [{bid}, {ask}]")]
    PriceOutsideSpread {
        /// The offending price.
        price: Decimal,
        /// Reported bid.
        bid: Decimal,
        /// Reported ask.
        ask: Decimal,
    },

    /// Price deviates too far from the last accepted price.
    #[error(
        "price deviation {deviation_pct}% from last accepted {last_price} exceeds {max_pct}%"
    )]
    ExcessiveDeviation {
        /// Observed deviation in percent, rounded for display.
        deviation_pct: Decimal,
        /// Last accepted price for the instrument.
        last_price: Decimal,
        /// Configured threshold in percent.
        max_pct: Decimal,
    },
}

impl ValidationFailure {
    /// Stable label for per-reason failure counters.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "decode",
            Self::NonPositivePrice { .. } => "non_positive_price",
            Self::PriceAboveCeiling { .. } => "price_ceiling",
            Self::StaleTimestamp { .. } => "stale_timestamp",
            Self::FutureTimestamp { .. } => "future_timestamp",
            Self::NegativeField { .. } => "negative_field",
            Self::FieldAboveCeiling { .. } => "field_ceiling",
            Self::BidAboveAsk { .. } => "bid_above_ask",
            Self::PriceOutsideSpread { .. } => "price_outside_spread",
            Self::ExcessiveDeviation { .. } => "price_deviation",
        }
    }
}

/// Last accepted price per instrument.
///
/// Process-scoped and never evicted: the instrument universe is expected
/// to stay small (tens to low hundreds), so a single coarse lock
/// serializes the per-instrument read-check-then-write without contention
/// worth sharding over.
#[derive(Debug, Default)]
pub struct LastPriceStore {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl LastPriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted price for an instrument.
    #[must_use]
    pub fn last_price(&self, instrument: &str) -> Option<Decimal> {
        self.prices.lock().get(instrument).copied()
    }

    /// Number of instruments tracked.
    #[must_use]
    pub fn tracked_instruments(&self) -> usize {
        self.prices.lock().len()
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// The record passed every check; warnings carry non-fatal findings.
    Accepted {
        /// The decoded tick.
        tick: PriceTick,
        /// Non-fatal findings, e.g. a permissive-mode deviation.
        warnings: Vec<String>,
    },
    /// The record was rejected; the failure list is non-empty and ordered
    /// by check order.
    Rejected {
        /// Everything that failed, in check order.
        failures: Vec<ValidationFailure>,
    },
}

/// The stateful validation engine.
#[derive(Debug)]
pub struct ValidationEngine {
    config: ValidationConfig,
    store: LastPriceStore,
}

impl ValidationEngine {
    /// Create an engine with an empty last-price store.
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            store: LastPriceStore::new(),
        }
    }

    /// The engine's last-price store, for observation.
    #[must_use]
    pub const fn store(&self) -> &LastPriceStore {
        &self.store
    }

    /// Validate one raw line against the current receiver clock.
    #[must_use]
    pub fn validate(&self, line: &str) -> ValidationVerdict {
        self.validate_at(line, Utc::now().timestamp_millis())
    }

    /// Validate one raw line as of `now_ms`.
    ///
    /// A rejected record never mutates the last-price store; an accepted
    /// record updates it before this method returns.
    #[must_use]
    pub fn validate_at(&self, line: &str, now_ms: i64) -> ValidationVerdict {
        let tick = match feed_wire::decode(line) {
            Ok(tick) => tick,
            Err(e) => {
                return ValidationVerdict::Rejected {
                    failures: vec![ValidationFailure::Malformed(e)],
                };
            }
        };

        let mut failures = Vec::new();
        self.check_ranges(&tick, now_ms, &mut failures);
        self.check_spread(&tick, &mut failures);
        if !failures.is_empty() {
            return ValidationVerdict::Rejected { failures };
        }

        self.check_deviation_and_update(tick)
    }

    fn check_ranges(&self, tick: &PriceTick, now_ms: i64, failures: &mut Vec<ValidationFailure>) {
        if tick.price <= Decimal::ZERO {
            failures.push(ValidationFailure::NonPositivePrice { price: tick.price });
        } else if tick.price > self.config.price_ceiling {
            failures.push(ValidationFailure::PriceAboveCeiling {
                price: tick.price,
                ceiling: self.config.price_ceiling,
            });
        }

        let age_ms = now_ms - tick.event_ts_ms;
        let max_age = self.config.max_timestamp_age;
        let max_skew = self.config.max_future_skew;
        if age_ms > millis_i64(max_age) {
            failures.push(ValidationFailure::StaleTimestamp {
                age_secs: age_ms / 1_000,
                max_secs: max_age.as_secs(),
            });
        } else if -age_ms > millis_i64(max_skew) {
            failures.push(ValidationFailure::FutureTimestamp {
                ahead_secs: -age_ms / 1_000,
                max_secs: max_skew.as_secs(),
            });
        }

        let optional_fields = [
            ("volume", tick.volume, self.config.volume_ceiling),
            ("bid", tick.bid, self.config.price_ceiling),
            ("ask", tick.ask, self.config.price_ceiling),
        ];
        for (field, value, ceiling) in optional_fields {
            let Some(value) = value else { continue };
            if value < Decimal::ZERO {
                failures.push(ValidationFailure::NegativeField { field, value });
            } else if value > ceiling {
                failures.push(ValidationFailure::FieldAboveCeiling {
                    field,
                    value,
                    ceiling,
                });
            }
        }
    }

    fn check_spread(&self, tick: &PriceTick, failures: &mut Vec<ValidationFailure>) {
        let (Some(bid), Some(ask)) = (tick.bid, tick.ask) else {
            return;
        };

        if bid > ask {
            failures.push(ValidationFailure::BidAboveAsk { bid, ask });
        } else if tick.price < bid || tick.price > ask {
            failures.push(ValidationFailure::PriceOutsideSpread {
                price: tick.price,
                bid,
                ask,
            });
        }
    }

    /// Anomaly check and state update under one guard, so concurrent
    /// reports for the same instrument serialize.
    fn check_deviation_and_update(&self, tick: PriceTick) -> ValidationVerdict {
        let mut prices = self.store.prices.lock();

        let deviation = prices.get(&tick.instrument).copied().and_then(|last| {
            let relative = ((tick.price - last) / last).abs();
            (relative > self.config.max_deviation).then_some((relative, last))
        });

        match deviation {
            Some((relative, last_price)) => {
                let failure = ValidationFailure::ExcessiveDeviation {
                    deviation_pct: (relative * Decimal::ONE_HUNDRED).round_dp(2),
                    last_price,
                    max_pct: self.config.max_deviation * Decimal::ONE_HUNDRED,
                };
                match self.config.mode {
                    ValidationMode::Strict => ValidationVerdict::Rejected {
                        failures: vec![failure],
                    },
                    ValidationMode::Permissive => {
                        prices.insert(tick.instrument.clone(), tick.price);
                        ValidationVerdict::Accepted {
                            warnings: vec![failure.to_string()],
                            tick,
                        }
                    }
                }
            }
            None => {
                prices.insert(tick.instrument.clone(), tick.price);
                ValidationVerdict::Accepted {
                    tick,
                    warnings: Vec::new(),
                }
            }
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn millis_i64(d: Duration) -> i64 {
    d.as_millis() as i64
}

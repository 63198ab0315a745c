//! Tick Line Codec
//!
//! Encodes and decodes one tick as a single delimited text line:
//!
//! ```text
//! INSTRUMENT|PRICE|TIMESTAMP_MS|VOLUME|BID|ASK
//! ```
//!
//! Decoding is strict on shape: exactly six fields, a well-formed instrument
//! code, and numeric fields that parse as decimals. An empty field is the
//! absent-value sentinel for the three optional fields only. No business
//! validation happens here; a structurally valid line with a negative price
//! decodes fine and is the validation layer's problem.

use rust_decimal::Decimal;

use crate::tick::PriceTick;

/// Field delimiter of the wire format.
pub const FIELD_DELIMITER: char = '|';

/// Exact number of fields in one record.
pub const FIELD_COUNT: usize = 6;

/// Instrument codes are 2 to 20 characters from `[A-Za-z0-9.=]`.
const INSTRUMENT_MIN_LEN: usize = 2;
const INSTRUMENT_MAX_LEN: usize = 20;

/// Decode failures, naming the violated shape/format rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The line did not split into exactly six fields.
    #[error("expected {FIELD_COUNT} fields, found {found}")]
    FieldCount {
        /// Number of fields actually present.
        found: usize,
    },

    /// A required field was empty.
    #[error("required field '{field}' is empty")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// The instrument code violates the allowed shape.
    #[error("invalid instrument code '{value}'")]
    InvalidInstrument {
        /// The offending instrument field.
        value: String,
    },

    /// A numeric field failed to parse as a decimal.
    #[error("field '{field}' is not a valid decimal: '{value}'")]
    InvalidNumber {
        /// Name of the numeric field.
        field: &'static str,
        /// The offending field content.
        value: String,
    },

    /// The event timestamp failed to parse as integer milliseconds.
    #[error("invalid event timestamp '{value}'")]
    InvalidTimestamp {
        /// The offending timestamp field.
        value: String,
    },
}

/// Encode a tick as one line of the wire format, without a trailing newline.
///
/// Absent optional fields become empty fields, so the output always carries
/// exactly six fields.
#[must_use]
pub fn encode(tick: &PriceTick) -> String {
    let optional = |v: &Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();

    format!(
        "{inst}{d}{price}{d}{ts}{d}{vol}{d}{bid}{d}{ask}",
        inst = tick.instrument,
        price = tick.price,
        ts = tick.event_ts_ms,
        vol = optional(&tick.volume),
        bid = optional(&tick.bid),
        ask = optional(&tick.ask),
        d = FIELD_DELIMITER,
    )
}

/// Decode one line of the wire format into a tick.
///
/// The instrument code is case-normalized to uppercase.
///
/// # Errors
///
/// Returns a [`DecodeError`] naming the first shape/format rule the line
/// violates. Fewer or more than six fields is a hard failure with no partial
/// acceptance.
pub fn decode(line: &str) -> Result<PriceTick, DecodeError> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            found: fields.len(),
        });
    }

    let instrument = parse_instrument(fields[0])?;
    let price = parse_required_decimal("price", fields[1])?;
    let event_ts_ms = parse_timestamp(fields[2])?;
    let volume = parse_optional_decimal("volume", fields[3])?;
    let bid = parse_optional_decimal("bid", fields[4])?;
    let ask = parse_optional_decimal("ask", fields[5])?;

    Ok(PriceTick {
        instrument,
        price,
        event_ts_ms,
        volume,
        bid,
        ask,
    })
}

fn is_instrument_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '='
}

fn parse_instrument(raw: &str) -> Result<String, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyField {
            field: "instrument",
        });
    }

    let valid = (INSTRUMENT_MIN_LEN..=INSTRUMENT_MAX_LEN).contains(&raw.len())
        && raw.chars().all(is_instrument_char);
    if !valid {
        return Err(DecodeError::InvalidInstrument {
            value: raw.to_string(),
        });
    }

    Ok(raw.to_ascii_uppercase())
}

fn parse_required_decimal(field: &'static str, raw: &str) -> Result<Decimal, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyField { field });
    }
    raw.parse::<Decimal>().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn parse_optional_decimal(
    field: &'static str,
    raw: &str,
) -> Result<Option<Decimal>, DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_required_decimal(field, raw).map(Some)
}

fn parse_timestamp(raw: &str) -> Result<i64, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyField {
            field: "event timestamp",
        });
    }
    raw.parse::<i64>().map_err(|_| DecodeError::InvalidTimestamp {
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    #[test]
    fn decode_full_record() {
        let tick = decode("AAPL.O|150.60|1705323000000|1000000|150.10|150.75").unwrap();
        assert_eq!(tick.instrument, "AAPL.O");
        assert_eq!(tick.price, dec(15_060, 2));
        assert_eq!(tick.event_ts_ms, 1_705_323_000_000);
        assert_eq!(tick.volume, Some(dec(1_000_000, 0)));
        assert_eq!(tick.bid, Some(dec(15_010, 2)));
        assert_eq!(tick.ask, Some(dec(15_075, 2)));
    }

    #[test]
    fn decode_minimal_record() {
        let tick = decode("EUR=|1.0850|1705323002000|||").unwrap();
        assert_eq!(tick.instrument, "EUR=");
        assert_eq!(tick.price, dec(10_850, 4));
        assert!(tick.volume.is_none());
        assert!(tick.bid.is_none());
        assert!(tick.ask.is_none());
    }

    #[test]
    fn decode_uppercases_instrument() {
        let tick = decode("aapl.o|1|1|||").unwrap();
        assert_eq!(tick.instrument, "AAPL.O");
    }

    #[test_case("TOO|FEW|FIELDS", 3; "three fields")]
    #[test_case("A|1|2||||EXTRA", 7; "seven fields")]
    #[test_case("", 1; "empty line is one field")]
    fn decode_arity(line: &str, found: usize) {
        assert_eq!(decode(line), Err(DecodeError::FieldCount { found }));
    }

    #[test_case("A"; "too short")]
    #[test_case("ABCDEFGHIJKLMNOPQRSTU"; "too long")]
    #[test_case("AA PL"; "embedded space")]
    #[test_case("AA$PL"; "bad symbol")]
    fn decode_rejects_bad_instrument(instrument: &str) {
        let line = format!("{instrument}|1.0|1705323000000|||");
        assert!(matches!(
            decode(&line),
            Err(DecodeError::InvalidInstrument { .. })
        ));
    }

    #[test]
    fn decode_rejects_empty_instrument() {
        assert_eq!(
            decode("|1.0|1705323000000|||"),
            Err(DecodeError::EmptyField {
                field: "instrument"
            })
        );
    }

    #[test]
    fn decode_rejects_empty_required_fields() {
        assert!(matches!(
            decode("AAPL.O||1705323000000|||"),
            Err(DecodeError::EmptyField { field: "price" })
        ));
        assert!(matches!(
            decode("AAPL.O|1.0||||"),
            Err(DecodeError::EmptyField { .. })
        ));
    }

    #[test]
    fn decode_rejects_non_numeric_fields() {
        assert!(matches!(
            decode("AAPL.O|abc|1705323000000|||"),
            Err(DecodeError::InvalidNumber { field: "price", .. })
        ));
        assert!(matches!(
            decode("AAPL.O|1.0|notatime|||"),
            Err(DecodeError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            decode("AAPL.O|1.0|1705323000000|x||"),
            Err(DecodeError::InvalidNumber {
                field: "volume",
                ..
            })
        ));
    }

    #[test]
    fn decode_accepts_negative_price_shape() {
        // Business rules live in the validation layer, not the codec.
        let tick = decode("AAPL.O|-5|1705323000000|||").unwrap();
        assert_eq!(tick.price, dec(-5, 0));
    }

    #[test]
    fn encode_absent_fields_are_empty() {
        let tick = PriceTick::new("EUR=".to_string(), dec(10_850, 4), 1_705_323_002_000);
        assert_eq!(encode(&tick), "EUR=|1.0850|1705323002000|||");
    }

    fn instrument_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            proptest::sample::select(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.="
                    .chars()
                    .collect::<Vec<_>>(),
            ),
            2..=20,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    fn decimal_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000_000_000, 0u32..=6).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
    }

    proptest! {
        #[test]
        fn round_trip_reproduces_tick(
            instrument in instrument_strategy(),
            price in decimal_strategy(),
            event_ts_ms in 0i64..4_102_444_800_000,
            volume in proptest::option::of(decimal_strategy()),
            bid in proptest::option::of(decimal_strategy()),
            ask in proptest::option::of(decimal_strategy()),
        ) {
            let tick = PriceTick {
                instrument: instrument.clone(),
                price,
                event_ts_ms,
                volume,
                bid,
                ask,
            };

            let decoded = decode(&encode(&tick)).unwrap();

            prop_assert_eq!(decoded.instrument, instrument.to_ascii_uppercase());
            prop_assert_eq!(decoded.price, price);
            prop_assert_eq!(decoded.event_ts_ms, event_ts_ms);
            prop_assert_eq!(decoded.volume, volume);
            prop_assert_eq!(decoded.bid, bid);
            prop_assert_eq!(decoded.ask, ask);
        }
    }
}

//! Line Framer
//!
//! Turns an arbitrary byte stream into discrete records at newline
//! boundaries. Bytes left over after the last newline stay buffered for the
//! next read; nothing already emitted is ever re-parsed. Records that are
//! empty after trimming are dropped silently.

/// Stateful newline splitter for one connection.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append bytes and extract every complete record they finish.
    ///
    /// Returned records are trimmed and non-empty, in stream order. A
    /// trailing partial line stays buffered; it is discarded with the
    /// framer when the connection closes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            let record = String::from_utf8_lossy(&line).trim().to_string();
            if !record.is_empty() {
                records.push(record);
            }
        }
        records
    }

    /// Bytes buffered waiting for their newline.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn splits_at_newlines() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"a|1\nb|2\nc|3\n");
        assert_eq!(records, vec!["a|1", "b|2", "c|3"]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"a|1\nb|"), vec!["a|1"]);
        assert_eq!(framer.buffered(), 2);
        assert_eq!(framer.push(b"2\n"), vec!["b|2"]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn trims_carriage_returns_and_whitespace() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"  a|1\r\n"), vec!["a|1"]);
    }

    #[test]
    fn empty_records_are_dropped_silently() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"\n\n   \n\r\na|1\n"), vec!["a|1"]);
    }

    #[test]
    fn byte_at_a_time_matches_bulk() {
        let input = b"AAPL.O|150.60|1705323000000|1000000|150.10|150.75\nEUR=|1.0850|1705323002000|||\n";

        let mut bulk = LineFramer::new();
        let bulk_records = bulk.push(input);

        let mut trickle = LineFramer::new();
        let mut trickle_records = Vec::new();
        for byte in input {
            trickle_records.extend(trickle.push(&[*byte]));
        }

        assert_eq!(bulk_records, trickle_records);
    }

    proptest! {
        /// Feeding the same stream split at arbitrary boundaries yields the
        /// identical record sequence.
        #[test]
        fn framing_is_split_invariant(
            lines in proptest::collection::vec("[ -~]{0,40}", 0..10),
            chunk_sizes in proptest::collection::vec(1usize..8, 0..64),
        ) {
            let input: Vec<u8> = lines
                .iter()
                .flat_map(|l| {
                    let mut bytes = l.as_bytes().to_vec();
                    bytes.push(b'\n');
                    bytes
                })
                .collect();

            let mut bulk = LineFramer::new();
            let expected = bulk.push(&input);

            let mut chunked = LineFramer::new();
            let mut actual = Vec::new();
            let mut offset = 0;
            let mut sizes = chunk_sizes.iter().copied().cycle();
            while offset < input.len() {
                let size = sizes.next().unwrap_or(1).min(input.len() - offset);
                actual.extend(chunked.push(&input[offset..offset + size]));
                offset += size;
            }

            prop_assert_eq!(expected, actual);
        }
    }
}

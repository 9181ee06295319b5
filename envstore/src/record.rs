//! The `key=value` records inside an environment payload
//!
//! A payload is a run of NUL-terminated `key=value` strings. The first empty string
//! (two NULs in a row, or a NUL at the very start) ends the list; whatever follows is
//! padding.
//!
//! ```text
//! ┌─────────────┬─────────────┬────┬──────────────────────┐
//! │ foo=bar \0  │ baz=qux \0  │ \0 │ padding ...          │
//! └─────────────┴─────────────┴────┴──────────────────────┘
//! ```

use std::{borrow::Cow, fmt, ops::Range};

use crate::EnvError;

/// One variable of the environment, borrowed from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    key: &'a [u8],
    value: &'a [u8],
    offset: usize,
}

impl<'a> Record<'a> {
    /// Creates a record that is not backed by a payload.
    /// Its [offset](Self::offset) is 0.
    pub fn new(key: &'a [u8], value: &'a [u8]) -> Self {
        Self {
            key,
            value,
            offset: 0,
        }
    }

    /// The variable name
    pub fn key(&self) -> &'a [u8] {
        self.key
    }

    /// Everything after the first `=`, which may itself contain `=`
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// The variable name for display
    pub fn key_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.key)
    }

    /// The value for display
    pub fn value_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.value)
    }

    /// Where the record starts in its payload
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The bytes of the value within the payload the record was parsed from
    pub fn value_range(&self) -> Range<usize> {
        let start = self.offset + self.key.len() + 1;
        start..start + self.value.len()
    }

    /// The number of bytes the record takes when encoded, including its NUL
    pub fn encoded_len(&self) -> usize {
        self.key.len() + 1 + self.value.len() + 1
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key_str(), self.value_str())
    }
}

/// Walks the records of a payload.
///
/// Yields an error for a record without `=` and stops after it. A payload that runs
/// out before the terminator ends the walk as well; a trailing unterminated run is
/// dropped.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    payload: &'a [u8],
    cursor: usize,
    done: bool,
}

impl<'a> Records<'a> {
    /// Starts walking at the beginning of `payload`
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            cursor: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, EnvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start = self.cursor;
        let rest = self.payload.get(start..).unwrap_or_default();

        let len = match rest.iter().position(|&b| b == 0) {
            Some(0) => {
                self.done = true;
                return None;
            }
            Some(len) => len,
            None => {
                if !rest.is_empty() {
                    tracing::warn!(
                        "Unterminated record at payload offset {:#x}, treating it as the end",
                        start
                    );
                }
                self.done = true;
                return None;
            }
        };

        let run = &rest[..len];
        self.cursor += len + 1;

        match run.iter().position(|&b| b == b'=') {
            Some(eq) => Some(Ok(Record {
                key: &run[..eq],
                value: &run[eq + 1..],
                offset: start,
            })),
            None => {
                self.done = true;
                Some(Err(EnvError::MalformedRecord { offset: start }))
            }
        }
    }
}

/// Parses all records of `payload`, in stored order.
pub fn parse(payload: &[u8]) -> Result<Vec<Record<'_>>, EnvError> {
    Records::new(payload).collect()
}

/// Finds the record named `key`. Names are compared byte for byte.
///
/// The scan stops at the first match, so a malformed record further down the
/// payload is not reported.
pub fn lookup<'a>(payload: &'a [u8], key: &[u8]) -> Result<Option<Record<'a>>, EnvError> {
    for record in Records::new(payload) {
        let record = record?;
        if record.key() == key {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// The bytes `records` take when encoded, including the terminating empty record
pub fn encoded_len(records: &[Record<'_>]) -> usize {
    records.iter().map(Record::encoded_len).sum::<usize>() + 1
}

/// Encodes `records` into `out` and zero-fills the rest of it.
///
/// Returns the number of bytes used, terminator included. When the records do not
/// fit, `out` is left untouched.
pub fn serialize(records: &[Record<'_>], out: &mut [u8]) -> Result<usize, EnvError> {
    let need = encoded_len(records);
    if need > out.len() {
        return Err(EnvError::WouldNotFit {
            need,
            capacity: out.len(),
        });
    }

    let mut pos = 0;
    for record in records {
        let key_end = pos + record.key.len();
        out[pos..key_end].copy_from_slice(record.key);
        out[key_end] = b'=';
        let value_end = key_end + 1 + record.value.len();
        out[key_end + 1..value_end].copy_from_slice(record.value);
        out[value_end] = 0;
        pos = value_end + 1;
    }
    out[pos..].fill(0);

    Ok(need)
}

/// Checks that `key` can be stored as a variable name
pub fn validate_key(key: &str) -> Result<(), EnvError> {
    if key.is_empty() || key.bytes().any(|b| b == b'=' || b == 0) {
        return Err(EnvError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Checks that `value` can be stored for `key`
pub fn validate_value(key: &str, value: &str) -> Result<(), EnvError> {
    if value.bytes().any(|b| b == 0) {
        return Err(EnvError::InvalidValue(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pairs<'a>(records: &[Record<'a>]) -> Vec<(&'a [u8], &'a [u8])> {
        records.iter().map(|r| (r.key(), r.value())).collect()
    }

    #[test]
    fn parses_until_terminator() {
        let payload = b"foo=bar\0baz=qux\0\0junk=after\0";
        let records = parse(payload).unwrap();

        assert_eq!(
            pairs(&records),
            vec![(&b"foo"[..], &b"bar"[..]), (&b"baz"[..], &b"qux"[..])]
        );
        assert_eq!(records[1].offset(), 8);
        assert_eq!(records[1].value_range(), 12..15);
    }

    #[test]
    fn empty_payload_has_no_records() {
        assert!(parse(b"").unwrap().is_empty());
        assert!(parse(b"\0foo=bar\0").unwrap().is_empty());
    }

    #[test]
    fn value_keeps_embedded_separators() {
        let records = parse(b"bootargs=console=ttyAMA0,115200 root=/dev/mtdblock2\0\0").unwrap();
        assert_eq!(records[0].key(), b"bootargs");
        assert_eq!(records[0].value(), b"console=ttyAMA0,115200 root=/dev/mtdblock2");
    }

    #[test]
    fn empty_key_and_value_are_kept() {
        let records = parse(b"=\0a=\0\0").unwrap();
        assert_eq!(pairs(&records), vec![(&b""[..], &b""[..]), (&b"a"[..], &b""[..])]);
    }

    #[test]
    fn record_without_separator_is_malformed() {
        let result = parse(b"foo=bar\0garbage\0baz=qux\0\0");
        assert!(matches!(
            result,
            Err(EnvError::MalformedRecord { offset: 8 })
        ));
    }

    #[test]
    fn walk_stops_after_malformed_record() {
        let mut records = Records::new(b"bad\0foo=bar\0\0");
        assert!(matches!(records.next(), Some(Err(EnvError::MalformedRecord { offset: 0 }))));
        assert!(records.next().is_none());
    }

    #[test]
    fn unterminated_tail_ends_the_walk() {
        let records = parse(b"foo=bar\0baz=q").unwrap();
        assert_eq!(pairs(&records), vec![(&b"foo"[..], &b"bar"[..])]);
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let payload = b"foo=bar\0baz=qux\0\0";
        assert_eq!(lookup(payload, b"foo").unwrap().unwrap().value(), b"bar");
        assert_eq!(lookup(payload, b"baz").unwrap().unwrap().value(), b"qux");
        assert!(lookup(payload, b"missing").unwrap().is_none());
        assert!(lookup(payload, b"FOO").unwrap().is_none());
        assert!(lookup(payload, b"fo").unwrap().is_none());
        assert!(lookup(payload, b"foo=").unwrap().is_none());
    }

    #[test]
    fn lookup_reports_malformed_record_before_match() {
        assert!(lookup(b"oops\0foo=bar\0\0", b"foo").is_err());
    }

    #[test]
    fn serialize_zero_fills_the_rest() {
        let mut out = [0xAAu8; 16];
        let records = [Record::new(b"a", b"1"), Record::new(b"bc", b"=2")];
        let used = serialize(&records, &mut out).unwrap();

        assert_eq!(used, 4 + 6 + 1);
        assert_eq!(&out, b"a=1\0bc==2\0\0\0\0\0\0\0");
    }

    #[test]
    fn serialize_refuses_to_truncate() {
        let mut out = [0xAAu8; 8];
        let records = [Record::new(b"key", b"long")];
        let result = serialize(&records, &mut out);

        assert!(matches!(result, Err(EnvError::WouldNotFit { need: 10, capacity: 8 })));
        assert_eq!(out, [0xAA; 8]);
    }

    #[test]
    fn serialize_exact_fit() {
        let mut out = [0xAAu8; 5];
        serialize(&[Record::new(b"a", b"b")], &mut out).unwrap();
        assert_eq!(&out, b"a=b\0\0");
    }

    #[test]
    fn display_joins_key_and_value() {
        assert_eq!(Record::new(b"ver", b"U-Boot 2016.11").to_string(), "ver=U-Boot 2016.11");
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("bootcmd").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a=b").is_err());
        assert!(validate_key("a\0b").is_err());
        assert!(validate_value("a", "x=y").is_ok());
        assert!(validate_value("a", "x\0y").is_err());
    }

    fn arb_records() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
        let key = prop::collection::vec(
            any::<u8>().prop_filter("no separator", |b| *b != 0 && *b != b'='),
            1..16,
        );
        let value = prop::collection::vec(any::<u8>().prop_filter("no nul", |b| *b != 0), 0..32);
        prop::collection::vec((key, value), 0..24)
    }

    proptest! {
        #[test]
        fn serialize_parse_round_trip(entries in arb_records(), slack in 0usize..64) {
            let records: Vec<Record<'_>> = entries.iter().map(|(k, v)| Record::new(k, v)).collect();
            let mut payload = vec![0u8; encoded_len(&records) + slack];
            serialize(&records, &mut payload).unwrap();

            let parsed = parse(&payload).unwrap();
            prop_assert_eq!(pairs(&parsed), pairs(&records));

            let mut again = vec![0xFFu8; payload.len()];
            serialize(&parsed, &mut again).unwrap();
            prop_assert_eq!(again, payload);
        }

        #[test]
        fn parsing_never_reads_out_of_bounds(
            payload in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            for record in Records::new(&payload).flatten() {
                prop_assert!(record.value_range().end <= payload.len());
            }
        }
    }
}

//! Prometheus duration strings (`5m`, `1h30m`, `100ms`, `2w`)
//!
//! Units must appear from largest to smallest and at most once each, as Prometheus requires.
//! The same parser is used for range selectors, offsets, subquery steps and for the interval
//! settings of the language server configuration.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("not a valid duration string: {0:?}")]
    Invalid(String),
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

const UNITS: &[(&str, u64)] = &[
    ("y", 365 * 24 * 60 * 60 * 1000),
    ("w", 7 * 24 * 60 * 60 * 1000),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
    ("ms", 1),
];

pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    if text.is_empty() {
        return Err(DurationError::Empty);
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let bytes = text.as_bytes();
    let mut pos = 0;
    let mut total: u64 = 0;
    // Index into UNITS of the last unit seen; later units must come after it.
    let mut last_unit: Option<usize> = None;

    while pos < bytes.len() {
        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == digits_start {
            return Err(DurationError::Invalid(text.to_string()));
        }
        let value: u64 = text[digits_start..pos]
            .parse()
            .map_err(|_| DurationError::Overflow(text.to_string()))?;

        let rest = &text[pos..];
        let (unit_index, unit_len) = if rest.starts_with("ms") {
            (6, 2)
        } else {
            match UNITS.iter().position(|(unit, _)| rest.starts_with(unit)) {
                Some(index) => (index, 1),
                None => return Err(DurationError::Invalid(text.to_string())),
            }
        };
        if last_unit.is_some_and(|last| unit_index <= last) {
            return Err(DurationError::Invalid(text.to_string()));
        }
        last_unit = Some(unit_index);
        pos += unit_len;

        let millis = value
            .checked_mul(UNITS[unit_index].1)
            .and_then(|ms| total.checked_add(ms))
            .ok_or_else(|| DurationError::Overflow(text.to_string()))?;
        total = millis;
    }

    Ok(Duration::from_millis(total))
}

/// Render a duration the way Prometheus prints it (`1h30m`, `0s`).
pub fn format_duration(duration: Duration) -> String {
    let mut millis = duration.as_millis() as u64;
    if millis == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in UNITS {
        if millis >= *size {
            out.push_str(&format!("{}{}", millis / size, unit));
            millis %= size;
        }
    }
    out
}

/// A duration that keeps the text it was written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromDuration(pub Duration);

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5m", 5 * 60 * 1000)]
    #[case("1h30m", 90 * 60 * 1000)]
    #[case("100ms", 100)]
    #[case("2w", 14 * 24 * 60 * 60 * 1000)]
    #[case("1y2d", (365 + 2) * 24 * 60 * 60 * 1000)]
    #[case("1m30s500ms", 90_500)]
    #[case("0", 0)]
    fn parses_valid_durations(#[case] text: &str, #[case] millis: u64) {
        assert_eq!(parse_duration(text), Ok(Duration::from_millis(millis)));
    }

    #[rstest]
    #[case("")]
    #[case("5")]
    #[case("m")]
    #[case("30m1h")]
    #[case("5m5m")]
    #[case("1.5h")]
    #[case("5x")]
    fn rejects_invalid_durations(#[case] text: &str) {
        assert!(parse_duration(text).is_err(), "{text:?} should not parse");
    }

    #[test]
    fn overflow_is_reported() {
        assert!(matches!(
            parse_duration("99999999999999999999y"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn formats_largest_units_first() {
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(
            PromDuration(Duration::from_secs(12 * 3600)).to_string(),
            "12h"
        );
    }
}

//! Human duration expressions
//!
//! Filters compare durations and show ages against expressions like `20m`,
//! `1h30m` or `1mm` (one month). This module parses those expressions into
//! [`chrono::Duration`] values and renders durations back into the same
//! notation for display.
//!
//! Calendar units are fixed equivalences: a month (`mm`) is 30 days, a year
//! (`y`) is 365 days.

use crate::error::{Error, Result};
use chrono::Duration;

/// Unit suffixes ordered longest-first so `mm` is not consumed as two
/// minute units.
const UNITS: &[(&str, i64)] = &[
    ("mm", 30 * 24 * 3600),
    ("y", 365 * 24 * 3600),
    ("w", 7 * 24 * 3600),
    ("d", 24 * 3600),
    ("h", 3600),
    ("m", 60),
    ("s", 1),
];

/// Parse a duration expression into a time span.
///
/// An expression is one or more `<number><unit>` groups, e.g. `20m`,
/// `1h30m`, `2d12h`. An empty or malformed expression is a configuration
/// error carrying the offending text.
pub fn parse(expression: &str) -> Result<Duration> {
    let mut rest = expression.trim();
    if rest.is_empty() {
        return Err(Error::config("empty duration expression", expression));
    }

    let mut total: i64 = 0;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::config("duration expression is missing a unit", expression))?;
        if digits_end == 0 {
            return Err(Error::config(
                "duration expression must start each group with a number",
                expression,
            ));
        }
        let value: i64 = rest[..digits_end]
            .parse()
            .map_err(|_| Error::config("duration value out of range", expression))?;
        rest = &rest[digits_end..];

        let (suffix, secs) = UNITS
            .iter()
            .find(|(suffix, _)| rest.starts_with(suffix))
            .ok_or_else(|| {
                Error::config(format!("unknown duration unit in {rest:?}"), expression)
            })?;
        rest = &rest[suffix.len()..];
        total = value
            .checked_mul(*secs)
            .and_then(|group| total.checked_add(group))
            .ok_or_else(|| Error::config("duration value out of range", expression))?;
    }

    Duration::try_seconds(total)
        .ok_or_else(|| Error::config("duration value out of range", expression))
}

/// Render a duration in the same notation that [`parse`] accepts, with
/// spaces between groups for readability: `1h 30m 10s`.
pub fn format(duration: Duration) -> String {
    let mut secs = duration.num_seconds();
    if secs == 0 {
        return "0s".to_string();
    }

    let negative = secs < 0;
    if negative {
        secs = -secs;
    }

    let mut parts = Vec::new();
    for (suffix, unit_secs) in UNITS {
        // mm and y overlap (30d vs 365d); skip months so `400d` renders as
        // `1y 35d` rather than mixing both calendar units.
        if *suffix == "mm" {
            continue;
        }
        let count = secs / unit_secs;
        if count > 0 {
            parts.push(format!("{count}{suffix}"));
            secs %= unit_secs;
        }
    }

    let rendered = parts.join(" ");
    if negative {
        format!("-{rendered}")
    } else {
        rendered
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes() {
        assert_eq!(parse("20m").unwrap(), Duration::seconds(1200));
    }

    #[test]
    fn parses_one_month_as_thirty_days() {
        assert_eq!(parse("1mm").unwrap(), Duration::days(30));
    }

    #[test]
    fn parses_compound_expressions() {
        assert_eq!(parse("1h30m").unwrap(), Duration::seconds(5400));
        assert_eq!(parse("2d12h").unwrap(), Duration::hours(60));
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse("90").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse("5q").is_err());
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_values_beyond_the_representable_span() {
        assert!(parse("9999999999999999s").is_err());
        assert!(parse("9999999999999999y").is_err());
        assert!(parse("99999999999999999999999999s").is_err());
    }

    #[test]
    fn formats_compound_durations() {
        assert_eq!(format(Duration::seconds(5410)), "1h 30m 10s");
        assert_eq!(format(Duration::seconds(0)), "0s");
        assert_eq!(format(Duration::days(8)), "1w 1d");
    }

    #[test]
    fn format_round_trips_through_parse() {
        for expr in ["45m", "1h5s", "3d", "2w1d4h"] {
            let parsed = parse(expr).unwrap();
            assert_eq!(parse(&format(parsed).replace(' ', "")).unwrap(), parsed);
        }
    }
}

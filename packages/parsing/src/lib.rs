#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared parsing utilities for withdrawal records.
//!
//! Volumes arrive in French or English notation (`12 000,56`, `12.000,56`,
//! `12000.56`), sometimes with a unit suffix. Years arrive as integers,
//! floats, numeric strings or free text containing a year. Neither parser
//! ever fails: an unusable volume is `NaN`, an unusable year is `None`.

use std::sync::LazyLock;

use prelev_models::RawValue;
use regex::Regex;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").unwrap_or_else(|_| unreachable!()));

/// Parses a raw attribute into a volume.
///
/// Returns `NaN` when nothing numeric can be recovered. `NaN` means "no
/// contribution": it is summed as zero and never counted as a valid value.
#[must_use]
pub fn parse_number(raw: &RawValue) -> f64 {
    match raw {
        RawValue::Integer(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => parse_number_str(s),
        RawValue::Null | RawValue::Unreadable => f64::NAN,
    }
}

/// Parses a volume written as text.
///
/// Spaces (including non-breaking ones) are thousands separators. When both
/// `.` and `,` appear, the first one is the thousands separator and the
/// other the decimal mark; a lone `,` is a decimal mark. Any remaining
/// character other than a digit, `.` or `-` is discarded.
#[must_use]
pub fn parse_number_str(s: &str) -> f64 {
    let compact: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if compact.is_empty() {
        return f64::NAN;
    }

    let normalized = match (compact.find('.'), compact.find(',')) {
        (Some(dot), Some(comma)) if dot < comma => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (None, Some(_)) => compact.replace(',', "."),
        _ => compact,
    };

    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    if matches!(cleaned.as_str(), "" | "." | "-" | "-.") {
        return f64::NAN;
    }

    cleaned.parse::<f64>().unwrap_or(f64::NAN)
}

/// Parses a raw attribute into a year.
///
/// Integers pass through, floats truncate, strings are first read as a
/// number (`"2023"`, `"2023.0"`) and otherwise scanned for the first run
/// of exactly four digits (`"Année 2023 (prov.)"`).
#[must_use]
pub fn parse_year(raw: &RawValue) -> Option<i32> {
    match raw {
        RawValue::Integer(i) => i32::try_from(*i).ok(),
        RawValue::Float(f) => truncate_year(*f),
        RawValue::Text(s) => parse_year_str(s),
        RawValue::Null | RawValue::Unreadable => None,
    }
}

/// Parses a year written as text. See [`parse_year`].
#[must_use]
pub fn parse_year_str(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return i32::try_from(i).ok();
    }
    if let Some(year) = s.parse::<f64>().ok().and_then(truncate_year) {
        return Some(year);
    }

    DIGIT_RUN
        .find_iter(s)
        .find(|m| m.as_str().len() == 4)
        .and_then(|m| m.as_str().parse().ok())
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_year(f: f64) -> Option<i32> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    if truncated < f64::from(i32::MIN) || truncated > f64::from(i32::MAX) {
        return None;
    }
    Some(truncated as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Writes `int` with `sep` between groups of three digits.
    fn group_thousands(int: u64, sep: &str) -> String {
        let digits = int.to_string();
        let mut out = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push_str(sep);
            }
            out.push(c);
        }
        out
    }

    #[test]
    fn groups_thousands_from_the_right() {
        assert_eq!(group_thousands(1_234_567, " "), "1 234 567");
        assert_eq!(group_thousands(999, "\u{a0}"), "999");
        assert_eq!(group_thousands(12_000, ""), "12000");
    }

    #[test]
    fn parses_french_grouping_with_decimal_comma() {
        assert!(approx(parse_number_str("12 000,56"), 12_000.56));
        assert!(approx(parse_number_str("12\u{a0}000,56"), 12_000.56));
    }

    #[test]
    fn parses_dot_grouping_with_decimal_comma() {
        assert!(approx(parse_number_str("12.000,56"), 12_000.56));
    }

    #[test]
    fn parses_comma_grouping_with_decimal_point() {
        assert!(approx(parse_number_str("12,000.56"), 12_000.56));
    }

    #[test]
    fn parses_plain_decimal_point() {
        assert!(approx(parse_number_str("12000.56"), 12_000.56));
    }

    #[test]
    fn strips_unit_suffix() {
        assert!(approx(parse_number_str("1 500 m³"), 1_500.0));
        assert!(approx(parse_number_str("-42,5 m³/an"), -42.5));
    }

    #[test]
    fn digits_inside_units_are_kept() {
        // Only non-digit characters are discarded, so "m3" contributes a 3.
        assert!(approx(parse_number_str("1 500 m3"), 15_003.0));
    }

    #[test]
    fn empty_and_garbage_are_nan() {
        for s in ["", "   ", "abc", ".", "-", "-.", "m³", "1.2.3"] {
            assert!(parse_number_str(s).is_nan(), "{s:?} should be NaN");
        }
    }

    #[test]
    fn raw_numbers_pass_through() {
        assert!(approx(parse_number(&RawValue::Integer(7)), 7.0));
        assert!(approx(parse_number(&RawValue::Float(7.25)), 7.25));
        assert!(parse_number(&RawValue::Null).is_nan());
        assert!(parse_number(&RawValue::Unreadable).is_nan());
    }

    #[test]
    fn parses_years() {
        assert_eq!(parse_year(&RawValue::Integer(2023)), Some(2023));
        assert_eq!(parse_year(&RawValue::Float(2023.9)), Some(2023));
        assert_eq!(parse_year(&RawValue::from("2023")), Some(2023));
        assert_eq!(parse_year(&RawValue::from("2023.0")), Some(2023));
        assert_eq!(parse_year(&RawValue::from("Année 2023 (prov.)")), Some(2023));
        assert_eq!(parse_year(&RawValue::from("campagne 2021-2022")), Some(2021));
    }

    #[test]
    fn rejects_missing_years() {
        assert_eq!(parse_year(&RawValue::from("")), None);
        assert_eq!(parse_year(&RawValue::from("n/a")), None);
        assert_eq!(parse_year(&RawValue::from("ref 12345")), None);
        assert_eq!(parse_year(&RawValue::Float(f64::NAN)), None);
        assert_eq!(parse_year(&RawValue::Null), None);
        assert_eq!(parse_year(&RawValue::Unreadable), None);
    }

    proptest! {
        #[test]
        fn parse_number_is_idempotent_on_its_output(x in -1.0e12_f64..1.0e12) {
            let first = parse_number_str(&format!("{x}"));
            let second = parse_number_str(&format!("{first}"));
            prop_assert_eq!(first.to_bits(), second.to_bits());
        }

        #[test]
        fn parse_number_reads_french_notation(
            negative in any::<bool>(),
            int in 0_u64..10_000_000_000,
            sep in prop::sample::select(vec![" ", "\u{a0}", "\u{202f}", ""]),
            frac in 0_u32..1000,
        ) {
            let sign = if negative { "-" } else { "" };
            let french = format!("{sign}{},{frac:03}", group_thousands(int, sep));
            let expected: f64 = format!("{sign}{int}.{frac:03}").parse().unwrap();

            let parsed = parse_number_str(&french);
            prop_assert_eq!(parsed.to_bits(), expected.to_bits(), "{:?}", french);

            let canonical = parse_number_str(&format!("{parsed}"));
            prop_assert_eq!(canonical.to_bits(), parsed.to_bits());
        }

        #[test]
        fn parse_number_never_panics(s in "\\PC*") {
            let _ = parse_number_str(&s);
        }

        #[test]
        fn parse_year_round_trips_integers(year in 1900_i32..2100) {
            prop_assert_eq!(parse_year_str(&year.to_string()), Some(year));
        }
    }
}

//! Large-number notation for in-game currency amounts
//!
//! Amounts such as `10.5q` or `1.2AA` are a decimal mantissa followed by a suffix
//! naming a power of ten. The suffix table escalates in steps of 10^3 from `K`
//! through `D`, then continues with the two-letter tiers `AA`..`AJ`.
//!
//! Case is significant for `q`/`Q` (quadrillion/quintillion) and `s`/`S`
//! (sextillion/septillion). Every other suffix matches case-insensitively.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix table ordered by ascending exponent
pub const NOTATION_SUFFIXES: &[(&str, i32)] = &[
    ("K", 3),
    ("M", 6),
    ("B", 9),
    ("T", 12),
    ("q", 15),
    ("Q", 18),
    ("s", 21),
    ("S", 24),
    ("O", 27),
    ("N", 30),
    ("D", 33),
    ("AA", 36),
    ("AB", 39),
    ("AC", 42),
    ("AD", 45),
    ("AE", 48),
    ("AF", 51),
    ("AG", 54),
    ("AH", 57),
    ("AI", 60),
    ("AJ", 63),
];

/// Suffix letters whose case changes their meaning
const CASE_SIGNIFICANT: [char; 4] = ['q', 'Q', 's', 'S'];

/// Decimal separator preference used for parsing typed input and for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    /// `1,234.5` style
    #[default]
    Period,
    /// `1.234,5` style
    Comma,
}

impl DecimalSeparator {
    /// Character used between integer and fractional digits
    pub fn as_char(self) -> char {
        match self {
            DecimalSeparator::Period => '.',
            DecimalSeparator::Comma => ',',
        }
    }

    pub(crate) fn is_grouping(self, c: char) -> bool {
        match self {
            DecimalSeparator::Period => matches!(c, ',' | ' ' | '_' | '\''),
            DecimalSeparator::Comma => matches!(c, '.' | ' ' | '_' | '\''),
        }
    }
}

/// Split `input` into its numeric mantissa text and trailing alphabetic suffix
fn split_suffix(input: &str) -> (&str, &str) {
    let suffix_start = input
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    (input[..suffix_start].trim_end(), &input[suffix_start..])
}

/// Look up a suffix's power of ten
///
/// Exact matches win; otherwise letters are compared case-insensitively,
/// except that `q`/`Q`/`s`/`S` never match across case.
pub fn suffix_exponent(suffix: &str) -> Option<i32> {
    if let Some((_, exp)) = NOTATION_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(*exp);
    }
    if suffix.chars().any(|c| CASE_SIGNIFICANT.contains(&c)) {
        return None;
    }
    NOTATION_SUFFIXES
        .iter()
        .filter(|(s, _)| !s.chars().any(|c| CASE_SIGNIFICANT.contains(&c)))
        .find(|(s, _)| s.eq_ignore_ascii_case(suffix))
        .map(|(_, exp)| *exp)
}

/// Parse a notation amount using period decimals (`1,234.5K`)
///
/// Unparseable input yields 0.
pub fn parse_magnitude(input: &str) -> f64 {
    parse_magnitude_with(input, DecimalSeparator::Period)
}

/// Parse a notation amount with an explicit decimal separator preference
///
/// Grouping characters are stripped, an optional trailing suffix multiplies the
/// mantissa. Anything that does not parse yields 0.
pub fn parse_magnitude_with(input: &str, separator: DecimalSeparator) -> f64 {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !separator.is_grouping(*c))
        .map(|c| if c == separator.as_char() { '.' } else { c })
        .collect();

    let (mantissa_text, suffix) = split_suffix(&cleaned);
    let mantissa: f64 = match mantissa_text.parse() {
        Ok(m) => m,
        Err(_) => return 0.0,
    };
    if !mantissa.is_finite() {
        return 0.0;
    }

    if suffix.is_empty() {
        return mantissa;
    }
    match suffix_exponent(suffix) {
        Some(exp) => mantissa * 10f64.powi(exp),
        None => 0.0,
    }
}

/// Numeric value of a JSON field holding either a number or notation text
pub fn magnitude_from_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_magnitude(s),
        _ => 0.0,
    }
}

/// Round to 2 decimals and drop trailing zeros (`1.50` → `1.5`, `2.00` → `2`)
fn trim_decimal(value: f64, separator: DecimalSeparator) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    let text = if text.is_empty() || text == "-" { "0" } else { text };
    text.replace('.', &separator.as_char().to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a value with the largest suffix whose multiplier does not exceed it
///
/// Values below 1000 carry no suffix, so a mantissa below 1 is never produced
/// for values of at least 1. When rounding lands on 1000 the value moves up a
/// tier (`999.999K` formats as `1M`).
pub fn format_magnitude(value: f64, separator: DecimalSeparator) -> String {
    if !value.is_finite() || value == 0.0 {
        return "0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    let mut tier = NOTATION_SUFFIXES
        .iter()
        .rposition(|(_, exp)| 10f64.powi(*exp) <= abs);

    let mut mantissa = match tier {
        Some(i) => round2(abs / 10f64.powi(NOTATION_SUFFIXES[i].1)),
        None => round2(abs),
    };

    if mantissa >= 1000.0 {
        let next = tier.map_or(0, |i| i + 1);
        if next < NOTATION_SUFFIXES.len() {
            tier = Some(next);
            mantissa = round2(abs / 10f64.powi(NOTATION_SUFFIXES[next].1));
        }
    }

    let suffix = tier.map_or("", |i| NOTATION_SUFFIXES[i].0);
    format!("{}{}{}", sign, trim_decimal(mantissa, separator), suffix)
}

/// Uppercase the trailing suffix letters except `q`/`Q`/`s`/`S`
///
/// `5m` → `5M`, `2aa` → `2AA`, `10.5q` stays `10.5q`.
pub fn standardize_notation_case(value: &str) -> String {
    let trimmed = value.trim();
    let (mantissa, suffix) = split_suffix(trimmed);
    let suffix: String = suffix
        .chars()
        .map(|c| {
            if CASE_SIGNIFICANT.contains(&c) {
                c
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();
    format!("{}{}", mantissa, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        if b == 0.0 {
            return a.abs() < 1e-9;
        }
        ((a - b) / b).abs() < 1e-9
    }

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!(parse_magnitude("1234"), 1234.0);
        assert_eq!(parse_magnitude("1,234,567"), 1_234_567.0);
        assert!(approx(parse_magnitude("5M"), 5e6));
        assert!(approx(parse_magnitude("10.5q"), 10.5e15));
        assert!(approx(parse_magnitude("2.5AA"), 2.5e36));
        assert!(approx(parse_magnitude(" 7 K "), 7000.0));
    }

    #[test]
    fn test_parse_case_significance() {
        assert!(approx(parse_magnitude("1q"), 1e15));
        assert!(approx(parse_magnitude("1Q"), 1e18));
        assert!(approx(parse_magnitude("1s"), 1e21));
        assert!(approx(parse_magnitude("1S"), 1e24));
        // Non-significant letters fold case
        assert!(approx(parse_magnitude("3k"), 3e3));
        assert!(approx(parse_magnitude("3b"), 3e9));
        assert!(approx(parse_magnitude("1aj"), 1e63));
    }

    #[test]
    fn test_parse_unparseable_yields_zero() {
        assert_eq!(parse_magnitude(""), 0.0);
        assert_eq!(parse_magnitude("abc"), 0.0);
        assert_eq!(parse_magnitude("12X"), 0.0);
        assert_eq!(parse_magnitude("K"), 0.0);
        assert_eq!(parse_magnitude("1.2.3M"), 0.0);
    }

    #[test]
    fn test_parse_comma_decimal() {
        assert!(approx(parse_magnitude_with("10,5q", DecimalSeparator::Comma), 10.5e15));
        assert!(approx(parse_magnitude_with("1.234,5", DecimalSeparator::Comma), 1234.5));
    }

    #[test]
    fn test_magnitude_from_value() {
        assert_eq!(magnitude_from_value(&serde_json::json!(5000000)), 5e6);
        assert!(approx(magnitude_from_value(&serde_json::json!("5M")), 5e6));
        assert_eq!(magnitude_from_value(&serde_json::json!(null)), 0.0);
    }

    #[test]
    fn test_format_picks_largest_suffix() {
        let p = DecimalSeparator::Period;
        assert_eq!(format_magnitude(0.0, p), "0");
        assert_eq!(format_magnitude(950.0, p), "950");
        assert_eq!(format_magnitude(1500.0, p), "1.5K");
        assert_eq!(format_magnitude(5_000_000.0, p), "5M");
        assert_eq!(format_magnitude(10.5e15, p), "10.5q");
        assert_eq!(format_magnitude(1.234e18, p), "1.23Q");
        assert_eq!(format_magnitude(-2500.0, p), "-2.5K");
    }

    #[test]
    fn test_format_never_emits_sub_one_mantissa() {
        let p = DecimalSeparator::Period;
        assert_eq!(format_magnitude(900.0, p), "900");
        assert_eq!(format_magnitude(999.999, p), "1K");
        assert_eq!(format_magnitude(999_999.0, p), "1M");
        assert_eq!(format_magnitude(0.5, p), "0.5");
    }

    #[test]
    fn test_format_comma_separator() {
        assert_eq!(format_magnitude(1500.0, DecimalSeparator::Comma), "1,5K");
    }

    #[test]
    fn test_round_trip_within_two_decimals() {
        for v in [1.0, 12.34, 999.0, 1234.0, 5.67e6, 10.5e15, 3.21e24, 7.5e40] {
            let text = format_magnitude(v, DecimalSeparator::Period);
            let back = parse_magnitude(&text);
            let tier = NOTATION_SUFFIXES
                .iter()
                .rev()
                .find(|(_, exp)| 10f64.powi(*exp) <= v)
                .map_or(1.0, |(_, exp)| 10f64.powi(*exp));
            assert!((back - v).abs() <= 0.005 * tier + 1e-9 * v, "{v} -> {text} -> {back}");
        }
    }

    #[test]
    fn test_standardize_notation_case() {
        assert_eq!(standardize_notation_case("5m"), "5M");
        assert_eq!(standardize_notation_case("2aa"), "2AA");
        assert_eq!(standardize_notation_case("10.5q"), "10.5q");
        assert_eq!(standardize_notation_case("3S"), "3S");
        assert_eq!(standardize_notation_case("3s"), "3s");
        assert_eq!(standardize_notation_case(" 42 "), "42");
    }
}

//! Locale-aware numeric normalization.
//!
//! Exports disagree on the decimal separator (`1.234,56` vs `1,234.56`), so
//! the separator is inferred once per column from a sample and then applied
//! to every value.

use serde::{Deserialize, Serialize};
use tracing::debug;

use hhdw_model::text::is_null_token;

/// Number of non-null values inspected when inferring the separator.
pub const SAMPLE_SIZE: usize = 100;

/// Share of sampled values ending in `,d` or `,dd` above which the comma is
/// taken as the decimal separator.
pub const COMMA_DECIMAL_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    Comma,
    #[default]
    Dot,
}

/// Parses a string as f64, returning None for invalid or empty strings.
pub fn parse_f64(value: &str) -> Option<f64> {
    if value.trim().is_empty() {
        return None;
    }
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Formats a floating-point number as a string without trailing zeros.
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Drops currency, percent, space and any other character that is not a
/// digit, a separator or a minus sign.
pub fn strip_symbols(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect()
}

fn ends_with_comma_decimal(value: &str) -> bool {
    let Some(pos) = value.rfind(',') else {
        return false;
    };
    let tail = &value[pos + 1..];
    (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit())
}

/// Infers the decimal separator from the first [`SAMPLE_SIZE`] non-null values.
pub fn infer_decimal_separator<'a, I>(values: I) -> DecimalSeparator
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let sample: Vec<String> = values
        .into_iter()
        .flatten()
        .filter(|v| !is_null_token(v))
        .map(strip_symbols)
        .filter(|v| !v.is_empty())
        .take(SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return DecimalSeparator::Dot;
    }
    let comma_hits = sample.iter().filter(|v| ends_with_comma_decimal(v)).count();
    let ratio = comma_hits as f64 / sample.len() as f64;
    if ratio > COMMA_DECIMAL_RATIO {
        DecimalSeparator::Comma
    } else {
        DecimalSeparator::Dot
    }
}

/// Parses one value under a known separator. Unparseable values become `None`.
pub fn parse_with_separator(value: &str, separator: DecimalSeparator) -> Option<f64> {
    if is_null_token(value) {
        return None;
    }
    let stripped = strip_symbols(value);
    let swapped = match separator {
        DecimalSeparator::Comma => stripped.replace('.', "").replace(',', "."),
        DecimalSeparator::Dot => stripped.replace(',', ""),
    };
    parse_f64(&swapped)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub values: Vec<Option<f64>>,
    pub separator: DecimalSeparator,
}

/// Infers the separator for a column and parses every value with it.
pub fn normalize_numeric_column(values: &[Option<&str>]) -> NumericColumn {
    let separator = infer_decimal_separator(values.iter().copied());
    debug!(?separator, total = values.len(), "inferred decimal separator");
    let parsed = values
        .iter()
        .map(|value| value.and_then(|v| parse_with_separator(v, separator)))
        .collect();
    NumericColumn {
        values: parsed,
        separator,
    }
}

/// Normalizes a single free-standing value, inferring the separator from the
/// value alone.
pub fn normalize_numeric(value: &str) -> Option<f64> {
    let separator = infer_decimal_separator([Some(value)]);
    parse_with_separator(value, separator)
}

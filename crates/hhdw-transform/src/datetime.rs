//! Date normalization for free-form source columns.
//!
//! Source exports mix day-first and month-first layouts, Spanish month names
//! and spreadsheet serial numbers. Values are parsed one at a time with an
//! explicit [`DateOrder`]; [`normalize_date_column`] picks the order per column.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use hhdw_model::text::{is_null_token, strip_diacritics};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which component comes first in all-numeric dates such as `03/04/2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    fn other(self) -> Self {
        match self {
            DateOrder::DayFirst => DateOrder::MonthFirst,
            DateOrder::MonthFirst => DateOrder::DayFirst,
        }
    }
}

/// Spanish month names and abbreviations mapped to the English abbreviation
/// understood by `%b`. Full names are listed before their prefixes.
const MONTH_TOKENS: &[(&str, &str)] = &[
    ("ENERO", "Jan"),
    ("FEBRERO", "Feb"),
    ("MARZO", "Mar"),
    ("ABRIL", "Apr"),
    ("MAYO", "May"),
    ("JUNIO", "Jun"),
    ("JULIO", "Jul"),
    ("AGOSTO", "Aug"),
    ("SEPTIEMBRE", "Sep"),
    ("SETIEMBRE", "Sep"),
    ("OCTUBRE", "Oct"),
    ("NOVIEMBRE", "Nov"),
    ("DICIEMBRE", "Dec"),
    ("ENE", "Jan"),
    ("ABR", "Apr"),
    ("AGO", "Aug"),
    ("SEPT", "Sep"),
    ("SET", "Sep"),
    ("DIC", "Dec"),
];

/// Connector words in long-form dates ("15 de enero de 2024").
const FILLER_TOKENS: &[&str] = &["DE", "DEL"];

/// Rewrites Spanish month tokens to English abbreviations.
///
/// Tokens that are already English (`Jan`, `March`) are left untouched, as are
/// digits and separators.
pub fn translate_month_tokens(value: &str) -> String {
    let folded = strip_diacritics(value);
    let mut out = String::with_capacity(folded.len());
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        let upper = word.to_ascii_uppercase();
        if FILLER_TOKENS.contains(&upper.as_str()) {
            // drop the word and the separator that preceded it
            if out.ends_with(' ') {
                out.pop();
            }
        } else if let Some((_, english)) = MONTH_TOKENS.iter().find(|(es, _)| *es == upper) {
            out.push_str(english);
        } else {
            out.push_str(word);
        }
        word.clear();
    };

    for ch in folded.chars() {
        if ch.is_ascii_alphabetic() {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out);
    out.trim().to_string()
}

const ISO_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d-%m-%y"];

const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%m/%d/%y", "%m-%d-%y"];

const MONTH_NAME_FORMATS: &[&str] = &[
    "%d-%b-%Y", "%d %b %Y", "%d/%b/%Y", "%d-%B-%Y", "%d %B %Y", "%b %d %Y", "%b %d, %Y",
    "%B %d %Y", "%B %d, %Y", "%Y-%b-%d", "%d-%b-%y",
];

const TIME_SUFFIXES: &[&str] = &[
    " %H:%M:%S",
    " %H:%M",
    "T%H:%M:%S",
    "T%H:%M:%S%.f",
    " %H:%M:%S%.f",
];

/// Years outside this range are treated as a misparse (e.g. `%Y` reading `24`).
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;
    PLAUSIBLE_YEARS.contains(&date.year()).then_some(date)
}

fn parse_with_formats(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    for fmt in formats {
        if let Some(date) = NaiveDate::parse_from_str(value, fmt).ok().and_then(plausible) {
            return Some(date);
        }
        for suffix in TIME_SUFFIXES {
            let with_time = format!("{fmt}{suffix}");
            if let Some(date) = NaiveDateTime::parse_from_str(value, &with_time)
                .ok()
                .and_then(|dt| plausible(dt.date()))
            {
                return Some(date);
            }
        }
    }
    None
}

/// Compact `YYYYMMDD` or a spreadsheet serial day number.
fn parse_fallback(value: &str) -> Option<NaiveDate> {
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(plausible);
    }
    let serial: i64 = value.parse().ok()?;
    if !(20_000..=80_000).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial))
}

/// Parses one value with the given order preference.
///
/// Returns `None` for blanks, null tokens and anything unparseable.
pub fn parse_date_with(value: &str, order: DateOrder) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if is_null_token(trimmed) {
        return None;
    }
    let translated = translate_month_tokens(trimmed);
    let ordered = match order {
        DateOrder::DayFirst => DAY_FIRST_FORMATS,
        DateOrder::MonthFirst => MONTH_FIRST_FORMATS,
    };

    parse_with_formats(&translated, ISO_FORMATS)
        .or_else(|| parse_with_formats(&translated, ordered))
        .or_else(|| parse_with_formats(&translated, MONTH_NAME_FORMATS))
        .or_else(|| parse_fallback(&translated))
}

/// Parses one value with the day-first preference used by every source.
pub fn normalize_date(value: &str) -> Option<NaiveDate> {
    parse_date_with(value, DateOrder::DayFirst)
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Normalizes a date-valued attribute for storage and comparison.
///
/// Parseable values come back as `YYYY-MM-DD`; anything else is returned
/// trimmed so the original text is not lost.
pub fn canonical_date_text(value: &str) -> String {
    match normalize_date(value) {
        Some(date) => format_date(date),
        None => value.trim().to_string(),
    }
}

/// Column names that hold dates in the source exports.
pub fn is_date_column(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    ["fecha", "date", "fch", "fech"]
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Parsed column plus the order that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DateColumn {
    pub values: Vec<Option<NaiveDate>>,
    pub order: DateOrder,
}

impl DateColumn {
    pub fn parsed_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

fn parse_column(values: &[Option<&str>], order: DateOrder) -> Vec<Option<NaiveDate>> {
    values
        .iter()
        .map(|value| value.and_then(|v| parse_date_with(v, order)))
        .collect()
}

/// Parses a whole column, day-first by default.
///
/// When day-first parses at most a fifth of the values, the column is parsed
/// again month-first and whichever order produced more dates is kept.
pub fn normalize_date_column(values: &[Option<&str>]) -> DateColumn {
    let preferred = DateOrder::default();
    let first = parse_column(values, preferred);
    let first_count = first.iter().filter(|v| v.is_some()).count();

    if values.is_empty() || first_count * 5 > values.len() {
        return DateColumn {
            values: first,
            order: preferred,
        };
    }

    let alternate = preferred.other();
    let second = parse_column(values, alternate);
    let second_count = second.iter().filter(|v| v.is_some()).count();
    debug!(
        day_first = first_count,
        month_first = second_count,
        total = values.len(),
        "retried date column with month-first order"
    );

    if second_count > first_count {
        DateColumn {
            values: second,
            order: alternate,
        }
    } else {
        DateColumn {
            values: first,
            order: preferred,
        }
    }
}

//! Row-level cleaning applied after header canonicalization.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use hhdw_model::SourceTable;
use hhdw_model::text::{is_null_token, strip_invisible};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid HTML tag regex"));

/// Counts reported by [`clean_rows`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub empty_rows_dropped: usize,
    pub duplicate_rows_dropped: usize,
    pub cells_with_markup: usize,
    pub rows_out: usize,
}

/// Strips markup and invisible characters, trims, and blanks null tokens.
///
/// Returns the cleaned text and whether HTML tags were removed.
pub fn clean_cell(raw: &str) -> (String, bool) {
    let visible = strip_invisible(raw);
    let had_markup = HTML_TAG.is_match(&visible);
    let text = if had_markup {
        HTML_TAG.replace_all(&visible, " ").into_owned()
    } else {
        visible
    };
    let trimmed = text.trim();
    if is_null_token(trimmed) {
        (String::new(), had_markup)
    } else {
        (trimmed.to_string(), had_markup)
    }
}

/// SHA-256 fingerprint of a row; cells are separated by NUL so `["ab", "c"]`
/// and `["a", "bc"]` differ.
pub fn row_fingerprint(row: &[String]) -> String {
    let mut hasher = Sha256::new();
    for cell in row {
        hasher.update(cell.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Cleans every cell, then drops fully empty rows and exact duplicates
/// (first occurrence kept).
pub fn clean_rows(rows: Vec<Vec<String>>) -> (Vec<Vec<String>>, CleanReport) {
    let mut report = CleanReport {
        rows_in: rows.len(),
        ..CleanReport::default()
    };
    let mut seen = HashSet::with_capacity(rows.len());
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let cleaned: Vec<String> = row
            .iter()
            .map(|cell| {
                let (text, had_markup) = clean_cell(cell);
                if had_markup {
                    report.cells_with_markup += 1;
                }
                text
            })
            .collect();

        if cleaned.iter().all(String::is_empty) {
            report.empty_rows_dropped += 1;
            continue;
        }
        if !seen.insert(row_fingerprint(&cleaned)) {
            report.duplicate_rows_dropped += 1;
            continue;
        }
        out.push(cleaned);
    }

    report.rows_out = out.len();
    (out, report)
}

/// Removes test records whose `column` contains `marker` (case-insensitive).
///
/// Returns the number of records removed.
pub fn exclude_marked(table: &mut SourceTable, column: &str, marker: &str) -> usize {
    let marker = marker.trim().to_lowercase();
    if marker.is_empty() {
        return 0;
    }
    let before = table.records.len();
    table.records.retain(|record| {
        record
            .get(column)
            .is_none_or(|value| !value.to_lowercase().contains(&marker))
    });
    before - table.records.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn test_clean_cell() {
        assert_eq!(clean_cell("  <b>ACETAMINOFEN</b> "), ("ACETAMINOFEN".to_string(), true));
        assert_eq!(clean_cell("\u{200b}EQ-001"), ("EQ-001".to_string(), false));
        assert_eq!(clean_cell("NaN"), (String::new(), false));
    }

    #[test]
    fn test_clean_rows_drops_empty_and_duplicates() {
        let rows = vec![
            row(&["1", "a"]),
            row(&["", "  "]),
            row(&[" 1", "a "]),
            row(&["2", "<p>b</p>"]),
        ];
        let (out, report) = clean_rows(rows);
        assert_eq!(out, vec![row(&["1", "a"]), row(&["2", "b"])]);
        assert_eq!(report.rows_in, 4);
        assert_eq!(report.empty_rows_dropped, 1);
        assert_eq!(report.duplicate_rows_dropped, 1);
        assert_eq!(report.cells_with_markup, 1);
        assert_eq!(report.rows_out, 2);
    }

    #[test]
    fn test_fingerprint_separates_cells() {
        assert_ne!(row_fingerprint(&row(&["ab", "c"])), row_fingerprint(&row(&["a", "bc"])));
    }
}

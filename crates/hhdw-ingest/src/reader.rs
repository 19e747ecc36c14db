//! Encoding- and delimiter-tolerant source reading.
//!
//! A file is decoded with each encoding of the ladder in turn and parsed with
//! each delimiter choice until one combination yields a table. Malformed
//! lines are skipped and counted instead of failing the read.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// Delimiters considered by the sniffer, in tie-break order.
pub const SNIFF_CANDIDATES: &[u8] = b",;\t|";

/// Lines inspected by the sniffer.
pub const SNIFF_LINES: usize = 20;

/// Share of sniffed lines that must agree with the header's delimiter count.
const SNIFF_AGREEMENT: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterChoice {
    /// Detect from the first lines of the decoded text.
    Auto,
    Fixed(u8),
}

impl fmt::Display for DelimiterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterChoice::Auto => f.write_str("auto"),
            DelimiterChoice::Fixed(byte) => write!(f, "{}", describe_delimiter(*byte)),
        }
    }
}

/// Delimiter ladder tried for every encoding.
pub const DELIMITER_LADDER: &[DelimiterChoice] = &[
    DelimiterChoice::Auto,
    DelimiterChoice::Fixed(b';'),
    DelimiterChoice::Fixed(b','),
];

pub fn describe_delimiter(byte: u8) -> String {
    match byte {
        b'\t' => "TAB".to_string(),
        other => format!("'{}'", other as char),
    }
}

/// Encoding and delimiter that produced the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedFormat {
    pub encoding: &'static str,
    pub delimiter: u8,
    pub sniffed: bool,
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}{}",
            self.encoding,
            describe_delimiter(self.delimiter),
            if self.sniffed { " (sniffed)" } else { "" }
        )
    }
}

/// Raw tabular content of one source, before canonicalization.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub format: DetectedFormat,
    /// Lines dropped because they could not be aligned with the header.
    pub skipped_lines: usize,
}

/// Reads a source file, trying the encoding and delimiter ladders.
pub fn read_source(path: &Path) -> Result<SourceFrame> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::from_io(path, e))?;
    read_source_bytes(&bytes, path)
}

/// Same as [`read_source`] for bytes already in memory; `origin` is only used
/// in errors and logs.
pub fn read_source_bytes(bytes: &[u8], origin: &Path) -> Result<SourceFrame> {
    let mut attempts = Vec::new();

    for (encoding, text) in decode_ladder(bytes) {
        let Some(text) = text else {
            attempts.push(format!("{}: not valid", encoding.name()));
            continue;
        };
        for choice in DELIMITER_LADDER {
            match parse_with(&text, *choice) {
                Ok(mut frame) => {
                    frame.format.encoding = encoding.name();
                    debug!(
                        path = %origin.display(),
                        format = %frame.format,
                        rows = frame.rows.len(),
                        skipped = frame.skipped_lines,
                        "detected source format"
                    );
                    if frame.skipped_lines > 0 {
                        warn!(
                            path = %origin.display(),
                            skipped = frame.skipped_lines,
                            "skipped malformed lines"
                        );
                    }
                    return Ok(frame);
                }
                Err(reason) => {
                    attempts.push(format!("{}/{}: {}", encoding.name(), choice, reason));
                }
            }
        }
    }

    Err(IngestError::NoViableFormat {
        path: origin.to_path_buf(),
        attempts,
    })
}

/// Candidate decodings in ladder order. `None` marks an encoding the bytes
/// are not valid in.
fn decode_ladder(bytes: &[u8]) -> Vec<(&'static Encoding, Option<Cow<'_, str>>)> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let body = &bytes[bom_len..];
        let mut ladder = vec![(
            encoding,
            encoding.decode_without_bom_handling_and_without_replacement(body),
        )];
        if encoding == UTF_8 {
            ladder.push((
                WINDOWS_1252,
                WINDOWS_1252.decode_without_bom_handling_and_without_replacement(body),
            ));
        }
        return ladder;
    }
    vec![
        (
            UTF_8,
            UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
        ),
        (
            WINDOWS_1252,
            WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes),
        ),
    ]
}

/// Counts `delimiter` outside double-quoted sections.
fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Picks the candidate delimiter with a consistent, non-zero per-line count.
///
/// Among consistent candidates the one splitting the header into the most
/// fields wins; ties go to the earlier candidate.
pub fn sniff_delimiter(text: &str) -> Option<u8> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let header = lines.first()?;

    let mut best: Option<(u8, usize)> = None;
    for &candidate in SNIFF_CANDIDATES {
        let expected = count_unquoted(header, candidate);
        if expected == 0 {
            continue;
        }
        let agreeing = lines
            .iter()
            .filter(|line| count_unquoted(line, candidate) == expected)
            .count();
        if (agreeing as f64) < SNIFF_AGREEMENT * lines.len() as f64 {
            continue;
        }
        if best.is_none_or(|(_, count)| expected > count) {
            best = Some((candidate, expected));
        }
    }
    best.map(|(delimiter, _)| delimiter)
}

/// Parses decoded text with one delimiter choice.
///
/// Fails (with a reason for the attempt log) when no header row exists or
/// when more than half of the data lines cannot be aligned with the header.
fn parse_with(text: &str, choice: DelimiterChoice) -> std::result::Result<SourceFrame, String> {
    let (delimiter, sniffed) = match choice {
        DelimiterChoice::Auto => match sniff_delimiter(text) {
            Some(delimiter) => (delimiter, true),
            None => return Err("no consistent delimiter".to_string()),
        },
        DelimiterChoice::Fixed(delimiter) => (delimiter, false),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut skipped_lines = 0usize;

    for record in reader.records() {
        let Ok(record) = record else {
            skipped_lines += 1;
            continue;
        };
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        if headers.is_none() {
            if !cells.iter().all(|cell| cell.trim().is_empty()) {
                headers = Some(cells);
            }
            continue;
        }
        let width = headers.as_ref().map_or(0, Vec::len);
        if cells.len() > width {
            if cells[width..].iter().all(|cell| cell.trim().is_empty()) {
                cells.truncate(width);
            } else {
                skipped_lines += 1;
                continue;
            }
        }
        cells.resize(width, String::new());
        rows.push(cells);
    }

    let Some(headers) = headers else {
        return Err("no header row".to_string());
    };
    let data_lines = rows.len() + skipped_lines;
    if data_lines > 0 && skipped_lines * 2 > data_lines {
        return Err(format!(
            "{skipped_lines} of {data_lines} lines misaligned with header"
        ));
    }

    Ok(SourceFrame {
        headers,
        rows,
        format: DetectedFormat {
            encoding: UTF_8.name(),
            delimiter,
            sniffed,
        },
        skipped_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_semicolon() {
        let text = "a;b;c\n1;2;3\n4;5;6\n";
        assert_eq!(sniff_delimiter(text), Some(b';'));
    }

    #[test]
    fn test_sniff_ignores_quoted_delimiters() {
        let text = "name,qty\n\"GASA, 10CM\",2\n\"SONDA\",1\n";
        assert_eq!(sniff_delimiter(text), Some(b','));
    }

    #[test]
    fn test_sniff_prefers_wider_split() {
        // commas appear in values but semicolons split every line the same way
        let text = "a;b;c\n1,5;2;3\n4;5,5;6\n";
        assert_eq!(sniff_delimiter(text), Some(b';'));
    }

    #[test]
    fn test_sniff_none_for_single_column() {
        assert_eq!(sniff_delimiter("only\nvalues\n"), None);
    }

    #[test]
    fn test_long_lines_skipped_short_lines_padded() {
        let text = "a,b,c\n1,2,3\n4,5\n6,7,8,9\n10,11,12,\n";
        let frame = parse_with(text, DelimiterChoice::Fixed(b',')).expect("parse");
        assert_eq!(frame.rows.len(), 3);
        assert_eq!(frame.rows[1], vec!["4", "5", ""]);
        assert_eq!(frame.rows[2], vec!["10", "11", "12"]);
        assert_eq!(frame.skipped_lines, 1);
    }
}

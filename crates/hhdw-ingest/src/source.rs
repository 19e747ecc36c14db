//! Turns a source file into a [`SourceTable`] of canonical, cleaned records.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, info_span};

use hhdw_model::{RawRecord, SourceTable};

use crate::clean::{CleanReport, clean_rows};
use crate::error::Result;
use crate::header::canonicalize_headers;
use crate::reader::{DetectedFormat, read_source};

/// A loaded source with everything learned while reading it.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub table: SourceTable,
    pub original_headers: Vec<String>,
    pub format: DetectedFormat,
    pub skipped_lines: usize,
    pub clean: CleanReport,
}

/// Counts surfaced in run summaries and logs.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoadStats {
    pub rows: usize,
    pub skipped_lines: usize,
    pub clean: CleanReport,
}

impl LoadedSource {
    pub fn stats(&self) -> LoadStats {
        LoadStats {
            rows: self.table.len(),
            skipped_lines: self.skipped_lines,
            clean: self.clean,
        }
    }
}

/// Reads, canonicalizes and cleans one source file.
///
/// Every record gets the same `ingested_at` timestamp and is tagged with
/// `table_name`.
pub fn load_source(
    table_name: &str,
    path: &Path,
    ingested_at: NaiveDateTime,
) -> Result<LoadedSource> {
    let span = info_span!("load_source", table = %table_name, path = %path.display());
    let _guard = span.enter();

    let frame = read_source(path)?;
    let columns = canonicalize_headers(&frame.headers);
    debug!(columns = ?columns, "canonical headers");

    let (rows, clean) = clean_rows(frame.rows);
    let mut table = SourceTable::new(table_name, columns);
    table.records = rows
        .iter()
        .map(|row| RawRecord::from_row(&table.columns, row, ingested_at, table_name))
        .collect();

    info!(
        rows = table.len(),
        format = %frame.format,
        skipped_lines = frame.skipped_lines,
        empty_dropped = clean.empty_rows_dropped,
        duplicates_dropped = clean.duplicate_rows_dropped,
        "source loaded"
    );

    Ok(LoadedSource {
        table,
        original_headers: frame.headers,
        format: frame.format,
        skipped_lines: frame.skipped_lines,
        clean,
    })
}

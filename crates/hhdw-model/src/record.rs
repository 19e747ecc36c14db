use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single source row: canonical column name to raw text.
///
/// Records are immutable once produced; every consumer reads through
/// [`RawRecord::get`], which hides blank cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    values: BTreeMap<String, String>,
    ingested_at: NaiveDateTime,
    source_table: String,
}

impl RawRecord {
    pub fn new(
        values: BTreeMap<String, String>,
        ingested_at: NaiveDateTime,
        source_table: impl Into<String>,
    ) -> Self {
        Self {
            values,
            ingested_at,
            source_table: source_table.into(),
        }
    }

    /// Builds a record from parallel header/value slices.
    pub fn from_row(
        headers: &[String],
        row: &[String],
        ingested_at: NaiveDateTime,
        source_table: &str,
    ) -> Self {
        let values = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| (header.clone(), value.clone()))
            .collect();
        Self::new(values, ingested_at, source_table)
    }

    /// Returns the trimmed cell value, or `None` when the column is missing or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Raw cell text, including blanks.
    pub fn raw(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn ingested_at(&self) -> NaiveDateTime {
        self.ingested_at
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }
}

/// All records read from one source, with the canonical column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Cell values for one column in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a str>> {
        self.records.iter().map(move |record| record.get(column))
    }
}

//! Source ingestion for the warehouse pipeline.
//!
//! - **reader**: encoding and delimiter ladders, malformed-line tolerance
//! - **header**: deterministic column-name canonicalization
//! - **clean**: cell cleaning, empty/duplicate row removal, test-record exclusion
//! - **source**: the three steps above combined into a [`hhdw_model::SourceTable`]

pub mod clean;
pub mod error;
pub mod header;
pub mod reader;
pub mod source;

pub use clean::{CleanReport, clean_cell, clean_rows, exclude_marked, row_fingerprint};
pub use error::{IngestError, Result};
pub use header::{canonicalize_header, canonicalize_headers};
pub use reader::{
    DelimiterChoice, DetectedFormat, SourceFrame, read_source, read_source_bytes, sniff_delimiter,
};
pub use source::{LoadStats, LoadedSource, load_source};

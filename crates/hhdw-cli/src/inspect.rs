//! Source inspection without touching the warehouse.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{info_span, trace};

use hhdw_ingest::{CleanReport, DetectedFormat, canonicalize_header, load_source};
use hhdw_map::{RoleCatalog, RoleGroup, RoleMap};

use crate::logging::redact_value;

/// What the loader would see when reading one file.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub table: String,
    pub format: DetectedFormat,
    pub original_headers: Vec<String>,
    pub columns: Vec<String>,
    pub rows: usize,
    pub skipped_lines: usize,
    pub clean: CleanReport,
    pub roles: Vec<(RoleGroup, RoleMap)>,
}

impl InspectReport {
    /// Groups whose every role found a column.
    pub fn complete_groups(&self) -> impl Iterator<Item = RoleGroup> + '_ {
        self.roles
            .iter()
            .filter(|(_, roles)| roles.absent_roles().next().is_none())
            .map(|(group, _)| *group)
    }
}

/// Staging name derived from the file stem.
pub fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    canonicalize_header(&stem)
}

pub fn inspect_source(path: &Path, catalog: &RoleCatalog) -> Result<InspectReport> {
    let table_name = table_name_for(path);
    let span = info_span!("inspect", path = %path.display());
    let _guard = span.enter();

    let loaded = load_source(&table_name, path, Local::now().naive_local())
        .with_context(|| format!("read {}", path.display()))?;

    if let Some(first) = loaded.table.records.first() {
        for (column, value) in first.values() {
            trace!(column = %column, value = redact_value(value), "first record");
        }
    }

    let roles = catalog
        .groups()
        .map(|(group, locator)| (group, locator.locate(&loaded.table.columns)))
        .collect();

    Ok(InspectReport {
        path: path.to_path_buf(),
        table: table_name,
        format: loaded.format,
        rows: loaded.table.len(),
        columns: loaded.table.columns,
        original_headers: loaded.original_headers,
        skipped_lines: loaded.skipped_lines,
        clean: loaded.clean,
        roles,
    })
}

//! Warehouse load pipeline with explicit stages.
//!
//! The pipeline follows these stages in order:
//! 1. **Stage**: Read, canonicalize and clean each source, drop test records,
//!    bulk-load the raw copy into its staging table
//! 2. **Dimensions**: Merge every feeding source per dimension and upsert
//! 3. **Resolver**: Build the medication catalog from current dimension rows
//! 4. **Facts**: Resolve references and append fact rows
//!
//! Every stage invocation reports one ledger entry. A failing source or
//! dimension is recorded as ERROR and the pipeline moves on to the next
//! independent unit of work.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use hhdw_ingest::{DetectedFormat, LoadStats, exclude_marked, load_source};
use hhdw_map::{FuzzyResolver, RoleCatalog, RoleGroup};
use hhdw_map::roles::{INSURER, PATIENT_ID};
use hhdw_model::{DimensionKind, FactKind, LedgerEntry, RunStatus, SourceTable};
use hhdw_store::Warehouse;

use crate::config::{PipelineConfig, SourceConfig};
use crate::dimensions::{DimensionBatch, DimensionReport, apply_batch};
use crate::facts::{AssemblyReport, FactAssembler};
use crate::ledger::RunRecorder;

/// Dimensions in load order; catalogs come before the entities that
/// facts reference.
const DIMENSION_ORDER: [DimensionKind; 5] = [
    DimensionKind::Medication,
    DimensionKind::Patient,
    DimensionKind::Equipment,
    DimensionKind::Order,
    DimensionKind::Insurer,
];

/// Groups whose locators may carry the insurer and patient-id roles.
const REFERENCE_GROUPS: [RoleGroup; 3] = [
    RoleGroup::Patient,
    RoleGroup::EquipmentFact,
    RoleGroup::ServiceFact,
];

fn dimension_group(kind: DimensionKind) -> Option<RoleGroup> {
    match kind {
        DimensionKind::Patient => Some(RoleGroup::Patient),
        DimensionKind::Equipment => Some(RoleGroup::Equipment),
        DimensionKind::Medication => Some(RoleGroup::Medication),
        DimensionKind::Order => Some(RoleGroup::Order),
        DimensionKind::Insurer => None,
    }
}

fn fact_group(kind: FactKind) -> RoleGroup {
    match kind {
        FactKind::Equipment => RoleGroup::EquipmentFact,
        FactKind::ServiceRequest => RoleGroup::ServiceFact,
    }
}

// ============================================================================
// Stage 1: Stage
// ============================================================================

/// One source that made it into staging.
#[derive(Debug, Clone)]
pub struct StagedSource {
    pub config: SourceConfig,
    pub table: SourceTable,
    pub format: DetectedFormat,
    pub stats: LoadStats,
    /// Test records removed before staging.
    pub excluded: usize,
}

/// Staging counts for the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct StagedSummary {
    pub table: String,
    pub path: PathBuf,
    pub format: String,
    pub stats: LoadStats,
    pub excluded: usize,
}

impl From<&StagedSource> for StagedSummary {
    fn from(source: &StagedSource) -> Self {
        Self {
            table: source.table.name.clone(),
            path: source.config.path.clone(),
            format: source.format.to_string(),
            stats: source.stats,
            excluded: source.excluded,
        }
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Everything a run produced, in stage order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: NaiveDateTime,
    pub staged: Vec<StagedSummary>,
    pub dimensions: Vec<(DimensionKind, DimensionReport)>,
    pub facts: Vec<AssemblyReport>,
    pub entries: Vec<LedgerEntry>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(LedgerEntry::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == RunStatus::Error)
            .count()
    }

    pub fn facts_appended(&self) -> usize {
        self.facts.iter().map(|report| report.facts).sum()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// One configured run against one warehouse.
pub struct Pipeline<'a, W: Warehouse + ?Sized> {
    config: &'a PipelineConfig,
    store: &'a W,
    catalog: RoleCatalog,
    now: NaiveDateTime,
}

impl<'a, W: Warehouse + ?Sized> Pipeline<'a, W> {
    pub fn new(config: &'a PipelineConfig, store: &'a W) -> Result<Self> {
        config.validate()?;
        let catalog = RoleCatalog::with_overrides(&config.roles).context("compile role patterns")?;
        Ok(Self {
            config,
            store,
            catalog,
            now: Local::now().naive_local(),
        })
    }

    /// Fixes the run timestamp used for ingestion stamps and version validity.
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    /// Runs every stage. Only failures outside any single unit of work
    /// (such as an unusable role catalog) are returned as errors; everything
    /// else lands in the ledger.
    pub fn run(&self) -> Result<RunSummary> {
        let span = info_span!("pipeline", sources = self.config.sources.len());
        let _guard = span.enter();
        let started = Instant::now();
        let recorder = RunRecorder::new(self.store);

        let staged = self.stage(&recorder);
        let dimensions = self.load_dimensions(&staged, &recorder);
        let resolver = self.build_resolver(&recorder);
        let facts = self.load_facts(&staged, resolver.as_ref(), &recorder);

        let summary = RunSummary {
            started_at: self.now,
            staged: staged.iter().map(StagedSummary::from).collect(),
            dimensions,
            facts,
            entries: recorder.into_entries(),
        };
        info!(
            staged = summary.staged.len(),
            facts = summary.facts_appended(),
            errors = summary.error_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Stage 1
    // ------------------------------------------------------------------------

    /// Stages sources concurrently, at most `ingest.workers` at a time.
    /// Sources that fail are recorded and left out of later stages.
    pub fn stage(&self, recorder: &RunRecorder<'_, W>) -> Vec<StagedSource> {
        let mut staged = Vec::new();
        for chunk in self.config.sources.chunks(self.config.ingest.workers) {
            let results: Vec<Option<StagedSource>> = thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|source| scope.spawn(move || self.stage_source(source, recorder)))
                    .collect();
                handles
                    .into_iter()
                    .zip(chunk)
                    .map(|(handle, source)| match handle.join() {
                        Ok(result) => result,
                        Err(_) => {
                            recorder.error(
                                format!("stage:{}", source.table),
                                &"staging worker panicked",
                            );
                            None
                        }
                    })
                    .collect()
            });
            staged.extend(results.into_iter().flatten());
        }
        staged
    }

    fn stage_source(
        &self,
        source: &SourceConfig,
        recorder: &RunRecorder<'_, W>,
    ) -> Option<StagedSource> {
        let process = format!("stage:{}", source.table);
        match self.try_stage_source(source) {
            Ok(staged) => {
                let mut detail =
                    format!("{} rows staged from {}", staged.table.len(), staged.format);
                if staged.excluded > 0 {
                    detail.push_str(&format!(", {} test records excluded", staged.excluded));
                }
                recorder.ok(process, detail, staged.table.len());
                Some(staged)
            }
            Err(error) => {
                recorder.error(process, &format!("{error:#}"));
                None
            }
        }
    }

    fn try_stage_source(&self, source: &SourceConfig) -> Result<StagedSource> {
        let loaded = load_source(&source.table, &source.path, self.now)
            .with_context(|| format!("read {}", source.path.display()))?;
        let format = loaded.format;
        let mut stats = loaded.stats();
        let mut table = loaded.table;

        let mut excluded = 0;
        if let Some(marker) = &self.config.ingest.exclude_marker
            && let Some(column) = self.patient_column(&table)
        {
            excluded = exclude_marked(&mut table, &column, marker);
            if excluded > 0 {
                debug!(table = %table.name, column = %column, excluded, "test records excluded");
            }
        }

        self.store
            .bulk_load(&table)
            .with_context(|| format!("stage {}", table.name))?;

        stats.rows = table.len();
        Ok(StagedSource {
            config: source.clone(),
            table,
            format,
            stats,
            excluded,
        })
    }

    /// Column holding the patient identifier, located through any group
    /// that knows the role.
    fn patient_column(&self, table: &SourceTable) -> Option<String> {
        REFERENCE_GROUPS.iter().find_map(|group| {
            self.catalog
                .locator(*group)
                .locate(&table.columns)
                .get(PATIENT_ID)
                .map(str::to_string)
        })
    }

    // ------------------------------------------------------------------------
    // Stage 2
    // ------------------------------------------------------------------------

    pub fn load_dimensions(
        &self,
        staged: &[StagedSource],
        recorder: &RunRecorder<'_, W>,
    ) -> Vec<(DimensionKind, DimensionReport)> {
        let mut reports = Vec::new();
        for kind in DIMENSION_ORDER {
            let span = info_span!("dimension", %kind);
            let _guard = span.enter();

            let batch = self.collect_dimension(kind, staged);
            let process = format!("dimension:{kind}");
            let sources_without_key = batch.sources_without_key.clone();
            match apply_batch(self.store, batch, self.now) {
                Ok(report) => {
                    let mut detail = format!(
                        "{} keys: {} inserted, {} versioned, {} overwritten, {} unchanged",
                        report.keys,
                        report.inserted,
                        report.versioned,
                        report.overwritten,
                        report.unchanged
                    );
                    if report.rows_without_key > 0 {
                        detail.push_str(&format!(", {} rows without key", report.rows_without_key));
                    }
                    if !sources_without_key.is_empty() {
                        detail.push_str(&format!(
                            ", key absent in {}",
                            sources_without_key.join(", ")
                        ));
                    }
                    recorder.ok(process, detail, report.written());
                    reports.push((kind, report));
                }
                Err(error) => recorder.error(process, &error),
            }
        }
        reports
    }

    /// Merges every staged source that feeds `kind`.
    ///
    /// Insurer keys come from any source whose patient or fact columns carry
    /// an insurer, whatever its declared feeds.
    fn collect_dimension(&self, kind: DimensionKind, staged: &[StagedSource]) -> DimensionBatch {
        let mut batch = DimensionBatch::new(kind);
        match dimension_group(kind) {
            Some(group) => {
                for source in staged.iter().filter(|s| s.config.feeds(group)) {
                    let roles = self.catalog.locator(group).locate(&source.table.columns);
                    batch.add_source(&source.table, &roles);
                }
            }
            None => {
                for source in staged {
                    let insurer_roles = REFERENCE_GROUPS
                        .iter()
                        .filter(|group| source.config.feeds(**group))
                        .map(|group| self.catalog.locator(*group).locate(&source.table.columns))
                        .find(|roles| roles.is_present(INSURER));
                    if let Some(roles) = insurer_roles {
                        batch.add_source(&source.table, &roles);
                    }
                }
            }
        }
        batch
    }

    // ------------------------------------------------------------------------
    // Stage 3
    // ------------------------------------------------------------------------

    /// Medication catalog over `(code, name)` of every current medication.
    pub fn build_resolver(&self, recorder: &RunRecorder<'_, W>) -> Option<FuzzyResolver> {
        let process = "resolver:medication";
        let rows = match self.store.current_rows(DimensionKind::Medication) {
            Ok(rows) => rows,
            Err(error) => {
                recorder.error(process, &error);
                return None;
            }
        };
        let catalog = rows.iter().filter_map(|row| {
            row.attribute("nombre")
                .map(|name| (row.natural_key.as_str().to_string(), name.to_string()))
        });
        match FuzzyResolver::new(catalog, self.config.resolver.clone()) {
            Ok(resolver) => {
                if resolver.is_empty() {
                    warn!("medication catalog is empty, requested items will not resolve");
                }
                recorder.ok(
                    process,
                    format!("{} catalog entries", resolver.len()),
                    resolver.len(),
                );
                Some(resolver)
            }
            Err(error) => {
                recorder.error(process, &error);
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Stage 4
    // ------------------------------------------------------------------------

    pub fn load_facts(
        &self,
        staged: &[StagedSource],
        resolver: Option<&FuzzyResolver>,
        recorder: &RunRecorder<'_, W>,
    ) -> Vec<AssemblyReport> {
        let mut assembler = FactAssembler::new(self.store, self.now);
        if let Some(resolver) = resolver {
            assembler = assembler.with_resolver(resolver);
        }

        let mut reports = Vec::new();
        for kind in [FactKind::Equipment, FactKind::ServiceRequest] {
            let group = fact_group(kind);
            for source in staged.iter().filter(|s| s.config.feeds(group)) {
                let process = format!("facts:{}:{}", source.table.name, kind.table_name());
                let roles = self.catalog.locator(group).locate(&source.table.columns);
                match assembler.load(kind, &source.table, &roles) {
                    Ok(report) => {
                        let detail = format!(
                            "{} of {} rows: {} missing reference, {} unresolved, {} unparseable date",
                            report.facts,
                            report.candidates,
                            report.missing_reference,
                            report.unresolved,
                            report.unparseable_dates
                        );
                        recorder.ok(process, detail, report.facts);
                        reports.push(report);
                    }
                    Err(error) => recorder.error(process, &error),
                }
            }
        }
        reports
    }
}

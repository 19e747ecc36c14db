//! Fact assembly.
//!
//! Each candidate row resolves its natural keys to current surrogate ids,
//! creating minimal dimension rows on demand, and resolves its event date.
//! Rows with a missing required reference are dropped and counted, never
//! raised. Everything that qualifies is appended in one batch.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use hhdw_map::roles::{
    EQUIPMENT_KEY, EVENT_DATE, INSURER, MEDICATION_KEY, ORDER_KEY, PATIENT_ID, REQUESTED_ITEM,
};
use hhdw_map::{FuzzyResolver, Resolution, ResolutionStats, RoleMap, UnresolvedPolicy};
use hhdw_model::{
    DateKey, DimensionKind, EquipmentEvent, FactEvent, FactKind, NaturalKey, RawRecord,
    Redacted, ServiceRequestEvent, SourceTable, SurrogateId,
};
use hhdw_store::{DimensionStore, FactSink};
use hhdw_transform::normalize_date_column;

use crate::dimensions::role_value;

/// Drop accounting for one fact load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssemblyReport {
    pub kind: FactKind,
    pub candidates: usize,
    pub facts: usize,
    /// Rows lacking a required natural key or event date.
    pub missing_reference: usize,
    /// Rows whose free-text item matched nothing in the catalog.
    pub unresolved: usize,
    /// Rows whose event date cell is filled but could not be parsed.
    pub unparseable_dates: usize,
    /// Dimension rows created because a fact referenced an unseen key.
    pub created_on_demand: usize,
    pub resolution: ResolutionStats,
}

impl AssemblyReport {
    fn new(kind: FactKind, candidates: usize) -> Self {
        Self {
            kind,
            candidates,
            facts: 0,
            missing_reference: 0,
            unresolved: 0,
            unparseable_dates: 0,
            created_on_demand: 0,
            resolution: ResolutionStats::default(),
        }
    }

    pub fn dropped(&self) -> usize {
        self.candidates - self.facts
    }
}

/// Why a candidate row did not become a fact.
enum Rejection {
    MissingReference(&'static str),
    Unresolved,
    UnparseableDate,
}

/// Resolves references for one batch of candidate rows.
///
/// Surrogate ids are cached for the lifetime of the assembler, so a key
/// repeated across rows costs one store lookup.
pub struct FactAssembler<'a, S: DimensionStore + FactSink + ?Sized> {
    store: &'a S,
    resolver: Option<&'a FuzzyResolver>,
    now: NaiveDateTime,
    cache: HashMap<(DimensionKind, NaturalKey), SurrogateId>,
}

impl<'a, S: DimensionStore + FactSink + ?Sized> FactAssembler<'a, S> {
    pub fn new(store: &'a S, now: NaiveDateTime) -> Self {
        Self {
            store,
            resolver: None,
            now,
            cache: HashMap::new(),
        }
    }

    /// Catalog used to resolve free-text requested items to medication codes.
    pub fn with_resolver(mut self, resolver: &'a FuzzyResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Current surrogate id for a key, creating a minimal row when unseen.
    fn surrogate(
        &mut self,
        kind: DimensionKind,
        key: NaturalKey,
        report: &mut AssemblyReport,
    ) -> hhdw_store::Result<SurrogateId> {
        if let Some(id) = self.cache.get(&(kind, key.clone())) {
            return Ok(*id);
        }
        let id = match self.store.resolve_current(kind, &key)? {
            Some(current) => current.surrogate_id,
            None => {
                report.created_on_demand += 1;
                debug!(%kind, key = %Redacted(&key), "reference created on demand");
                self.store.ensure_current(kind, &key, self.now)?
            }
        };
        self.cache.insert((kind, key), id);
        Ok(id)
    }

    fn optional(
        &mut self,
        kind: DimensionKind,
        record: &RawRecord,
        roles: &RoleMap,
        role: &'static str,
        report: &mut AssemblyReport,
    ) -> hhdw_store::Result<Option<SurrogateId>> {
        NaturalKey::from_cell(role_value(record, roles, role))
            .map(|key| self.surrogate(kind, key, report))
            .transpose()
    }

    /// Medication key from an explicit code column, else from the requested
    /// item text through the resolver.
    fn medication_key(
        &self,
        record: &RawRecord,
        roles: &RoleMap,
        report: &mut AssemblyReport,
    ) -> std::result::Result<NaturalKey, Rejection> {
        if let Some(key) = NaturalKey::from_cell(role_value(record, roles, MEDICATION_KEY)) {
            return Ok(key);
        }
        let Some(text) = role_value(record, roles, REQUESTED_ITEM) else {
            return Err(Rejection::MissingReference(REQUESTED_ITEM));
        };
        let Some(resolver) = self.resolver else {
            report.resolution.unresolved += 1;
            return Err(Rejection::Unresolved);
        };
        let resolution = resolver.resolve(text);
        report.resolution.record(&resolution);
        match resolution {
            Resolution::Matched(candidate) => {
                NaturalKey::new(&candidate.reference_code).map_err(|_| Rejection::Unresolved)
            }
            Resolution::Unresolved { normalized_text } => match resolver.policy() {
                UnresolvedPolicy::Drop => {
                    debug!(
                        text = %Redacted(&normalized_text),
                        "requested item unresolved, row dropped"
                    );
                    Err(Rejection::Unresolved)
                }
                UnresolvedPolicy::PassThrough => {
                    NaturalKey::new(text).map_err(|_| Rejection::Unresolved)
                }
            },
        }
    }

    fn reject(report: &mut AssemblyReport, rejection: &Rejection) {
        match rejection {
            Rejection::MissingReference(role) => {
                report.missing_reference += 1;
                debug!(role, "row dropped, reference missing");
            }
            Rejection::Unresolved => report.unresolved += 1,
            Rejection::UnparseableDate => report.unparseable_dates += 1,
        }
    }

    /// Builds equipment events: equipment, patient and date are required,
    /// the insurer is optional.
    pub fn assemble_equipment(
        &mut self,
        table: &SourceTable,
        roles: &RoleMap,
    ) -> hhdw_store::Result<(Vec<FactEvent>, AssemblyReport)> {
        let mut report = AssemblyReport::new(FactKind::Equipment, table.len());
        let dates = event_dates(table, roles);
        let mut facts = Vec::new();

        for (record, date) in table.records.iter().zip(dates) {
            let (equipment, patient, date) =
                match checked_keys(record, roles, EQUIPMENT_KEY, date) {
                    Ok(keys) => keys,
                    Err(rejection) => {
                        Self::reject(&mut report, &rejection);
                        continue;
                    }
                };
            let event = EquipmentEvent {
                equipment_id: self.surrogate(DimensionKind::Equipment, equipment, &mut report)?,
                patient_id: self.surrogate(DimensionKind::Patient, patient, &mut report)?,
                insurer_id: self.optional(
                    DimensionKind::Insurer,
                    record,
                    roles,
                    INSURER,
                    &mut report,
                )?,
                date,
            };
            facts.push(FactEvent::Equipment(event));
        }
        report.facts = facts.len();
        Ok((facts, report))
    }

    /// Builds service-request events: order, patient, medication and date
    /// are required, the insurer is optional.
    pub fn assemble_service_requests(
        &mut self,
        table: &SourceTable,
        roles: &RoleMap,
    ) -> hhdw_store::Result<(Vec<FactEvent>, AssemblyReport)> {
        let mut report = AssemblyReport::new(FactKind::ServiceRequest, table.len());
        let dates = event_dates(table, roles);
        let mut facts = Vec::new();

        for (record, date) in table.records.iter().zip(dates) {
            // every check runs before any lookup so dropped rows create nothing
            let checked = checked_keys(record, roles, ORDER_KEY, date).and_then(|keys| {
                let medication = self.medication_key(record, roles, &mut report)?;
                Ok((keys, medication))
            });
            let ((order, patient, date), medication) = match checked {
                Ok(keys) => keys,
                Err(rejection) => {
                    Self::reject(&mut report, &rejection);
                    continue;
                }
            };
            let event = ServiceRequestEvent {
                order_id: self.surrogate(DimensionKind::Order, order, &mut report)?,
                patient_id: self.surrogate(DimensionKind::Patient, patient, &mut report)?,
                insurer_id: self.optional(
                    DimensionKind::Insurer,
                    record,
                    roles,
                    INSURER,
                    &mut report,
                )?,
                medication_id: self.surrogate(DimensionKind::Medication, medication, &mut report)?,
                date,
            };
            facts.push(FactEvent::ServiceRequest(event));
        }
        report.facts = facts.len();
        Ok((facts, report))
    }

    /// Assembles and appends one source's facts of `kind` in a single batch.
    pub fn load(
        &mut self,
        kind: FactKind,
        table: &SourceTable,
        roles: &RoleMap,
    ) -> hhdw_store::Result<AssemblyReport> {
        let span = info_span!("assemble_facts", table = %table.name, kind = kind.table_name());
        let _guard = span.enter();

        let absent: Vec<&str> = required_roles(kind)
            .iter()
            .copied()
            .filter(|role| !roles.is_present(role))
            .collect();
        if !absent.is_empty() {
            warn!(?absent, "required roles absent, rows will be dropped");
        }

        let (facts, report) = match kind {
            FactKind::Equipment => self.assemble_equipment(table, roles)?,
            FactKind::ServiceRequest => self.assemble_service_requests(table, roles)?,
        };
        self.store.append_facts(&facts)?;
        info!(
            candidates = report.candidates,
            facts = report.facts,
            missing_reference = report.missing_reference,
            unresolved = report.unresolved,
            unparseable_dates = report.unparseable_dates,
            created_on_demand = report.created_on_demand,
            "facts appended"
        );
        Ok(report)
    }
}

fn required_key(
    record: &RawRecord,
    roles: &RoleMap,
    role: &'static str,
) -> std::result::Result<NaturalKey, Rejection> {
    NaturalKey::from_cell(role_value(record, roles, role)).ok_or(Rejection::MissingReference(role))
}

/// Subject key, patient key and event date shared by both fact kinds.
fn checked_keys(
    record: &RawRecord,
    roles: &RoleMap,
    subject_role: &'static str,
    date: Option<DateKey>,
) -> std::result::Result<(NaturalKey, NaturalKey, DateKey), Rejection> {
    let subject = required_key(record, roles, subject_role)?;
    let patient = required_key(record, roles, PATIENT_ID)?;
    let Some(date) = date else {
        let filled =
            role_value(record, roles, EVENT_DATE).is_some_and(|cell| !cell.trim().is_empty());
        return Err(if filled {
            Rejection::UnparseableDate
        } else {
            Rejection::MissingReference(EVENT_DATE)
        });
    };
    Ok((subject, patient, date))
}

/// Roles without which no row of `kind` can qualify.
pub fn required_roles(kind: FactKind) -> &'static [&'static str] {
    match kind {
        FactKind::Equipment => &[EQUIPMENT_KEY, PATIENT_ID, EVENT_DATE],
        FactKind::ServiceRequest => &[ORDER_KEY, PATIENT_ID, EVENT_DATE],
    }
}

/// Event dates for every row, normalized column-wide.
fn event_dates(table: &SourceTable, roles: &RoleMap) -> Vec<Option<DateKey>> {
    let Some(column) = roles.get(EVENT_DATE) else {
        return vec![None; table.len()];
    };
    let values: Vec<Option<&str>> = table.column_values(column).collect();
    let parsed = normalize_date_column(&values);
    debug!(
        column,
        order = ?parsed.order,
        parsed = parsed.parsed_count(),
        "event dates normalized"
    );
    parsed
        .values
        .into_iter()
        .map(|date| date.map(DateKey::from_date))
        .collect()
}

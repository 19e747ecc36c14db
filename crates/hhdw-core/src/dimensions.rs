//! Dimension builders.
//!
//! A builder walks every source that feeds one dimension, locates the roles it
//! needs, folds natural keys and merges sightings into one attribute set per
//! key. Later sightings win attribute by attribute: a blank cell never erases
//! a value seen earlier in the same run. The result is upserted in one batch.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info_span, warn};

use hhdw_map::RoleMap;
use hhdw_map::roles::{
    ADMISSION_DATE, DOSAGE_FORM, EQUIPMENT_KEY, EQUIPMENT_NAME, EQUIPMENT_STATUS, INSURER,
    MEDICATION_KEY, MEDICATION_NAME, MUNICIPALITY, ORDER_KEY, PATIENT_ID, PATIENT_NAME, QUANTITY,
    REQUESTED_ITEM, ROUTE, STATE, ZONE,
};
use hhdw_model::{Attributes, DimensionKind, NaturalKey, RawRecord, SourceTable};
use hhdw_store::{DimensionStore, UpsertAction};
use hhdw_transform::{format_date, format_numeric, normalize_date_column, normalize_numeric_column};

/// Natural-key role and `(role, attribute)` pairs for each dimension.
///
/// The insurer dimension has no row of its own: its key is the folded insurer
/// name, wherever an insurer column appears.
pub fn attribute_roles(
    kind: DimensionKind,
) -> (&'static str, &'static [(&'static str, &'static str)]) {
    match kind {
        DimensionKind::Patient => (
            PATIENT_ID,
            &[
                (PATIENT_NAME, "nombre"),
                (MUNICIPALITY, "municipio"),
                (STATE, "estado"),
                (INSURER, "aseguradora"),
                (ZONE, "zona"),
                (ADMISSION_DATE, "fecha_ingreso"),
            ],
        ),
        DimensionKind::Equipment => (
            EQUIPMENT_KEY,
            &[(EQUIPMENT_NAME, "equipo"), (EQUIPMENT_STATUS, "estado_equipo")],
        ),
        DimensionKind::Insurer => (INSURER, &[(INSURER, "aseguradora")]),
        DimensionKind::Medication => (
            MEDICATION_KEY,
            &[
                (MEDICATION_NAME, "nombre"),
                (DOSAGE_FORM, "forma_farmaceutica"),
                (ROUTE, "via_administracion"),
            ],
        ),
        DimensionKind::Order => (
            ORDER_KEY,
            &[(REQUESTED_ITEM, "insumo_solicitado"), (QUANTITY, "cantidad")],
        ),
    }
}

/// Merged sightings for one dimension, ready to upsert.
#[derive(Debug, Clone)]
pub struct DimensionBatch {
    pub kind: DimensionKind,
    rows: BTreeMap<NaturalKey, Attributes>,
    /// Rows seen across all sources.
    pub rows_read: usize,
    /// Rows whose natural key was blank or a null token.
    pub rows_without_key: usize,
    /// Sources skipped because the natural-key role was absent.
    pub sources_without_key: Vec<String>,
}

impl DimensionBatch {
    pub fn new(kind: DimensionKind) -> Self {
        Self {
            kind,
            rows: BTreeMap::new(),
            rows_read: 0,
            rows_without_key: 0,
            sources_without_key: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &NaturalKey) -> Option<&Attributes> {
        self.rows.get(key)
    }

    pub fn into_rows(self) -> Vec<(NaturalKey, Attributes)> {
        self.rows.into_iter().collect()
    }

    /// Adds every row of `table` using the located `roles`.
    pub fn add_source(&mut self, table: &SourceTable, roles: &RoleMap) {
        let span = info_span!("collect_dimension", kind = %self.kind, table = %table.name);
        let _guard = span.enter();

        let (key_role, attribute_roles) = attribute_roles(self.kind);
        let Some(key_column) = roles.get(key_role) else {
            warn!(role = key_role, "natural key role absent, source skipped");
            self.sources_without_key.push(table.name.clone());
            return;
        };
        let columns = NormalizedColumns::new(self.kind, table, roles, attribute_roles);

        for (index, record) in table.records.iter().enumerate() {
            self.rows_read += 1;
            let Some(key) = NaturalKey::from_cell(record.get(key_column)) else {
                self.rows_without_key += 1;
                continue;
            };
            let kind = self.kind;
            let merged = self
                .rows
                .entry(key)
                .or_insert_with(|| kind.empty_attributes());
            for (role, attribute) in attribute_roles {
                if let Some(value) = columns.value(index, role, role_value(record, roles, role)) {
                    merged.insert((*attribute).to_string(), Some(value));
                }
            }
        }
        debug!(keys = self.rows.len(), "dimension sightings merged");
    }
}

/// Cell value for a located role, `None` when the role is absent or the cell blank.
pub(crate) fn role_value<'r>(
    record: &'r RawRecord,
    roles: &RoleMap,
    role: &str,
) -> Option<&'r str> {
    roles.get(role).and_then(|column| record.get(column))
}

/// Column-wide date and numeric normalization for the roles that need it.
struct NormalizedColumns {
    dates: BTreeMap<&'static str, Vec<Option<String>>>,
    numbers: BTreeMap<&'static str, Vec<Option<String>>>,
}

impl NormalizedColumns {
    fn new(
        kind: DimensionKind,
        table: &SourceTable,
        roles: &RoleMap,
        attribute_roles: &[(&'static str, &'static str)],
    ) -> Self {
        let mut dates = BTreeMap::new();
        let mut numbers = BTreeMap::new();
        for (role, attribute) in attribute_roles {
            let Some(column) = roles.get(role) else {
                continue;
            };
            let values: Vec<Option<&str>> = table.column_values(column).collect();
            if kind.is_date_attribute(attribute) {
                let parsed = normalize_date_column(&values);
                debug!(
                    column,
                    order = ?parsed.order,
                    parsed = parsed.parsed_count(),
                    "date column normalized"
                );
                let values = parsed.values.into_iter().map(|d| d.map(format_date));
                dates.insert(*role, values.collect());
            } else if *role == QUANTITY {
                let parsed = normalize_numeric_column(&values);
                debug!(column, separator = ?parsed.separator, "numeric column normalized");
                let values = parsed.values.into_iter().map(|n| n.map(format_numeric));
                numbers.insert(*role, values.collect());
            }
        }
        Self { dates, numbers }
    }

    /// Normalized form of one cell. Unparseable dates keep their text;
    /// unparseable quantities become unset.
    fn value(&self, index: usize, role: &str, raw: Option<&str>) -> Option<String> {
        let raw = raw?;
        if let Some(column) = self.dates.get(role) {
            return Some(
                column
                    .get(index)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| raw.to_string()),
            );
        }
        if let Some(column) = self.numbers.get(role) {
            return column.get(index).cloned().flatten();
        }
        Some(raw.to_string())
    }
}

/// Counts from one dimension upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionReport {
    pub keys: usize,
    pub inserted: usize,
    pub versioned: usize,
    pub overwritten: usize,
    pub unchanged: usize,
    pub rows_without_key: usize,
}

impl DimensionReport {
    /// Rows the store actually wrote.
    pub fn written(&self) -> usize {
        self.inserted + self.versioned + self.overwritten
    }
}

/// Upserts a batch in one call and tallies what happened.
pub fn apply_batch<S: DimensionStore + ?Sized>(
    store: &S,
    batch: DimensionBatch,
    now: NaiveDateTime,
) -> hhdw_store::Result<DimensionReport> {
    let kind = batch.kind;
    let mut report = DimensionReport {
        keys: batch.len(),
        rows_without_key: batch.rows_without_key,
        ..DimensionReport::default()
    };
    let outcomes = store.upsert_batch(kind, &batch.into_rows(), now)?;
    for outcome in outcomes {
        match outcome.action {
            UpsertAction::Inserted => report.inserted += 1,
            UpsertAction::Versioned { .. } => report.versioned += 1,
            UpsertAction::Overwritten => report.overwritten += 1,
            UpsertAction::Unchanged => report.unchanged += 1,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use hhdw_map::{RoleCatalog, RoleGroup};

    use super::*;

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> SourceTable {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
            .expect("date")
            .and_hms_opt(0, 0, 0)
            .expect("time");
        let mut table = SourceTable::new(name, columns.clone());
        for row in rows {
            let row: Vec<String> = row.iter().map(|c| (*c).to_string()).collect();
            table.records.push(RawRecord::from_row(&columns, &row, ts, name));
        }
        table
    }

    #[test]
    fn later_sightings_win_but_blanks_do_not_erase() {
        let catalog = RoleCatalog::builtin().expect("roles");
        let first = table(
            "pacientes",
            &["documento_paciente", "nombre", "municipio", "fecha_ingreso"],
            &[&["1001", "ANA", "CALI", "15/01/2024"], &["1002", "LUIS", "", "03/02/2024"]],
        );
        let second = table(
            "pacientes_actualizados",
            &["documento_paciente", "nombre", "municipio"],
            &[&[" 1001 ", "", "PALMIRA"], &["demo", "", ""], &["", "SIN DOC", ""]],
        );

        let mut batch = DimensionBatch::new(DimensionKind::Patient);
        for source in [&first, &second] {
            let roles = catalog.locator(RoleGroup::Patient).locate(&source.columns);
            batch.add_source(source, &roles);
        }

        let ana = batch.get(&NaturalKey::new("1001").expect("key")).expect("ana");
        assert_eq!(ana["nombre"].as_deref(), Some("ANA"));
        assert_eq!(ana["municipio"].as_deref(), Some("PALMIRA"));
        assert_eq!(ana["fecha_ingreso"].as_deref(), Some("2024-01-15"));
        assert_eq!(batch.rows_read, 5);
        assert_eq!(batch.rows_without_key, 1);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn sources_without_key_role_are_skipped() {
        let catalog = RoleCatalog::builtin().expect("roles");
        let source = table("inventario", &["marca", "modelo"], &[&["X", "Y"]]);
        let roles = catalog.locator(RoleGroup::Order).locate(&source.columns);
        let mut batch = DimensionBatch::new(DimensionKind::Order);
        batch.add_source(&source, &roles);
        assert!(batch.is_empty());
        assert_eq!(batch.sources_without_key, vec!["inventario"]);
    }

    #[test]
    fn quantities_are_normalized() {
        let catalog = RoleCatalog::builtin().expect("roles");
        let source = table(
            "pedidos",
            &["numero_pedido", "insumo", "cantidad"],
            &[&["P-1", "Gasa", "1.234,5"], &["P-2", "Jeringa", "2,0"], &["P-3", "Sonda", "n/a"]],
        );
        let roles = catalog.locator(RoleGroup::Order).locate(&source.columns);
        let mut batch = DimensionBatch::new(DimensionKind::Order);
        batch.add_source(&source, &roles);
        let p1 = batch.get(&NaturalKey::new("P-1").expect("key")).expect("p1");
        assert_eq!(p1["cantidad"].as_deref(), Some("1234.5"));
        assert_eq!(p1["insumo_solicitado"].as_deref(), Some("Gasa"));
        let p3 = batch.get(&NaturalKey::new("P-3").expect("key")).expect("p3");
        assert_eq!(p3["cantidad"], None);
    }
}

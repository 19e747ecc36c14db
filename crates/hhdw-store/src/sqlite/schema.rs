//! Table naming and DDL for the SQLite backend.
//!
//! SQLite has no schemas, so the staging and warehouse schema names become
//! table name prefixes: `stg__equipos_entregados`, `dw_dim_equipo`.

use serde::{Deserialize, Serialize};

use hhdw_model::{DimensionKind, FactKind};

use crate::check_identifier;
use crate::error::Result;

/// Column stamped on every staging row with the ingestion timestamp.
pub const LOAD_TS_COLUMN: &str = "load_ts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaNames {
    pub staging: String,
    pub warehouse: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            staging: "stg".to_string(),
            warehouse: "dw".to_string(),
        }
    }
}

impl SchemaNames {
    pub fn validate(&self) -> Result<()> {
        check_identifier(&self.staging)?;
        check_identifier(&self.warehouse)
    }

    pub fn staging_table(&self, table: &str) -> String {
        format!("{}__{}", self.staging, table)
    }

    pub fn staging_prefix(&self) -> String {
        format!("{}__", self.staging)
    }

    pub fn dimension_table(&self, kind: DimensionKind) -> String {
        format!("{}_{}", self.warehouse, kind.table_name())
    }

    pub fn fact_table(&self, kind: FactKind) -> String {
        format!("{}_{}", self.warehouse, kind.table_name())
    }

    pub fn date_table(&self) -> String {
        format!("{}_dim_fecha", self.warehouse)
    }

    pub fn ledger_table(&self) -> String {
        format!("{}_etl_log", self.warehouse)
    }
}

pub(super) fn quoted_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn append_only_triggers(table: &str) -> String {
    format!(
        r#"
CREATE TRIGGER IF NOT EXISTS "{table}_no_update" BEFORE UPDATE ON "{table}"
BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;
CREATE TRIGGER IF NOT EXISTS "{table}_no_delete" BEFORE DELETE ON "{table}"
BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;"#
    )
}

/// One table per dimension kind. The partial unique index is what the
/// catalog upsert targets and what rejects a second current version.
fn dimension_ddl(names: &SchemaNames, kind: DimensionKind) -> String {
    let table = names.dimension_table(kind);
    let attributes: String = kind
        .tracked_attributes()
        .iter()
        .map(|name| format!("    \"{name}\" TEXT,\n"))
        .collect();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    surrogate_id INTEGER PRIMARY KEY AUTOINCREMENT,
    natural_key TEXT NOT NULL,
{attributes}    valid_from TEXT NOT NULL,
    valid_to TEXT,
    is_current INTEGER NOT NULL DEFAULT 1 CHECK (is_current IN (0, 1)),
    CHECK (valid_to IS NULL OR valid_to >= valid_from)
);
CREATE UNIQUE INDEX IF NOT EXISTS "{table}_current" ON "{table}" (natural_key) WHERE is_current = 1;
CREATE INDEX IF NOT EXISTS "{table}_key" ON "{table}" (natural_key);"#
    )
}

fn fact_ddl(names: &SchemaNames) -> String {
    let dates = names.date_table();
    let patient = names.dimension_table(DimensionKind::Patient);
    let equipment = names.dimension_table(DimensionKind::Equipment);
    let insurer = names.dimension_table(DimensionKind::Insurer);
    let medication = names.dimension_table(DimensionKind::Medication);
    let order = names.dimension_table(DimensionKind::Order);
    let equipment_facts = names.fact_table(FactKind::Equipment);
    let service_facts = names.fact_table(FactKind::ServiceRequest);
    let mut ddl = format!(
        r#"
CREATE TABLE IF NOT EXISTS "{dates}" (
    fecha_id INTEGER PRIMARY KEY,
    fecha TEXT NOT NULL UNIQUE,
    anio INTEGER NOT NULL,
    mes INTEGER NOT NULL,
    dia INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS "{equipment_facts}" (
    hecho_id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipo_id INTEGER NOT NULL REFERENCES "{equipment}" (surrogate_id),
    paciente_id INTEGER NOT NULL REFERENCES "{patient}" (surrogate_id),
    aseguradora_id INTEGER REFERENCES "{insurer}" (surrogate_id),
    fecha_id INTEGER NOT NULL REFERENCES "{dates}" (fecha_id)
);
CREATE TABLE IF NOT EXISTS "{service_facts}" (
    hecho_id INTEGER PRIMARY KEY AUTOINCREMENT,
    pedido_id INTEGER NOT NULL REFERENCES "{order}" (surrogate_id),
    paciente_id INTEGER NOT NULL REFERENCES "{patient}" (surrogate_id),
    aseguradora_id INTEGER REFERENCES "{insurer}" (surrogate_id),
    medicamento_id INTEGER NOT NULL REFERENCES "{medication}" (surrogate_id),
    fecha_id INTEGER NOT NULL REFERENCES "{dates}" (fecha_id)
);"#
    );
    ddl.push_str(&append_only_triggers(&equipment_facts));
    ddl.push_str(&append_only_triggers(&service_facts));
    ddl
}

fn ledger_ddl(names: &SchemaNames) -> String {
    let table = names.ledger_table();
    let mut ddl = format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    proceso TEXT NOT NULL,
    detalle TEXT NOT NULL,
    filas INTEGER NOT NULL,
    estado TEXT NOT NULL CHECK (estado IN ('OK', 'ERROR')),
    registrado TEXT NOT NULL
);"#
    );
    ddl.push_str(&append_only_triggers(&table));
    ddl
}

/// Everything except staging tables, which are created per source.
pub(super) fn warehouse_ddl(names: &SchemaNames) -> String {
    let mut ddl: String = DimensionKind::ALL
        .into_iter()
        .map(|kind| dimension_ddl(names, kind))
        .collect();
    ddl.push_str(&fact_ddl(names));
    ddl.push_str(&ledger_ddl(names));
    ddl
}

pub(super) fn staging_ddl(table: &str, columns: &[String]) -> String {
    let columns: String = columns
        .iter()
        .map(|column| format!("    \"{column}\" TEXT,\n"))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\n{columns}    \"{LOAD_TS_COLUMN}\" TEXT NOT NULL\n);"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_follow_schema_names() {
        let names = SchemaNames::default();
        assert_eq!(names.staging_table("equipos"), "stg__equipos");
        assert_eq!(names.dimension_table(DimensionKind::Equipment), "dw_dim_equipo");
        assert_eq!(
            names.fact_table(FactKind::ServiceRequest),
            "dw_hecho_solicitud_servicios"
        );
        assert!(
            SchemaNames {
                staging: "bad name".to_string(),
                ..SchemaNames::default()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn dimension_ddl_lists_tracked_attributes() {
        let ddl = dimension_ddl(&SchemaNames::default(), DimensionKind::Equipment);
        assert!(ddl.contains("\"equipo\" TEXT"));
        assert!(ddl.contains("\"estado_equipo\" TEXT"));
        assert!(ddl.contains("WHERE is_current = 1"));
    }
}

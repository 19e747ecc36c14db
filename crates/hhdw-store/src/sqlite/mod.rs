//! SQLite-backed warehouse.
//!
//! A single connection sits behind a mutex. Dimension upserts run inside an
//! `IMMEDIATE` transaction so the current-version read and the write that
//! follows cannot interleave with another writer, even one in a different
//! process sharing the file.

mod schema;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, TransactionBehavior, params};
use tracing::{debug, info};

use hhdw_model::{
    Attributes, DimensionKind, DimensionVersion, FactEvent, FactKind, LedgerEntry, NaturalKey,
    RawRecord, Redacted, RunStatus, SourceTable, SurrogateId, Versioning,
};

use crate::error::{Result, StoreError};
use crate::scd2::{
    UpsertAction, UpsertOutcome, UpsertPlan, plan_upsert, prepare_attributes, single_current,
};
use crate::{DimensionStore, FactSink, RunLedger, StagingStore, check_identifier};

pub use schema::{LOAD_TS_COLUMN, SchemaNames};

use schema::{placeholders, quoted_list, staging_ddl, warehouse_ddl};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
    names: SchemaNames,
}

impl std::fmt::Debug for SqliteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarehouse")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl SqliteWarehouse {
    /// Opens (or creates) a warehouse file and makes sure every warehouse
    /// table exists.
    pub fn open(path: &Path, names: SchemaNames) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "warehouse opened");
        Self::init(conn, names)
    }

    pub fn open_in_memory(names: SchemaNames) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, names)
    }

    fn init(conn: Connection, names: SchemaNames) -> Result<Self> {
        names.validate()?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&warehouse_ddl(&names))?;
        debug!(staging = %names.staging, warehouse = %names.warehouse, "warehouse schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            names,
        })
    }

    pub fn names(&self) -> &SchemaNames {
        &self.names
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

// === Dimensions ===

/// Row as stored, before the natural key is re-validated.
struct StoredVersion {
    surrogate_id: i64,
    natural_key: String,
    valid_from: NaiveDateTime,
    valid_to: Option<NaiveDateTime>,
    is_current: bool,
    attributes: Vec<Option<String>>,
}

impl StoredVersion {
    fn from_row(row: &Row<'_>, kind: DimensionKind) -> rusqlite::Result<Self> {
        let attributes = (0..kind.tracked_attributes().len())
            .map(|i| row.get(5 + i))
            .collect::<rusqlite::Result<Vec<Option<String>>>>()?;
        Ok(Self {
            surrogate_id: row.get(0)?,
            natural_key: row.get(1)?,
            valid_from: row.get(2)?,
            valid_to: row.get(3)?,
            is_current: row.get(4)?,
            attributes,
        })
    }

    fn into_version(self, kind: DimensionKind) -> Result<DimensionVersion> {
        let attributes = kind
            .tracked_attributes()
            .iter()
            .map(|name| (*name).to_string())
            .zip(self.attributes)
            .collect();
        Ok(DimensionVersion {
            surrogate_id: SurrogateId(self.surrogate_id),
            kind,
            natural_key: NaturalKey::new(&self.natural_key)?,
            attributes,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            is_current: self.is_current,
        })
    }
}

fn query_versions(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    filter: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<DimensionVersion>> {
    let sql = format!(
        "SELECT surrogate_id, natural_key, valid_from, valid_to, is_current, {} FROM \"{}\" {filter} ORDER BY surrogate_id",
        quoted_list(kind.tracked_attributes()),
        names.dimension_table(kind),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, |row| StoredVersion::from_row(row, kind))?;
    rows.map(|row| row.map_err(StoreError::from)?.into_version(kind))
        .collect()
}

fn current_version(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    key: &NaturalKey,
) -> Result<Option<DimensionVersion>> {
    let key_text = key.as_str();
    let rows = query_versions(
        conn,
        names,
        kind,
        "WHERE natural_key = ?1 AND is_current = 1",
        &[&key_text],
    )?;
    single_current(kind, key.as_str(), rows)
}

fn attribute_values<'a>(kind: DimensionKind, attributes: &'a Attributes) -> Vec<Option<&'a str>> {
    kind.tracked_attributes()
        .iter()
        .map(|name| attributes.get(*name).and_then(|v| v.as_deref()))
        .collect()
}

/// Appends a new current version.
fn insert_version(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    key: &NaturalKey,
    attributes: &Attributes,
    valid_from: NaiveDateTime,
) -> Result<SurrogateId> {
    let tracked = kind.tracked_attributes();
    let sql = format!(
        "INSERT INTO \"{}\" (natural_key, {}, valid_from, is_current) VALUES ({}, 1)",
        names.dimension_table(kind),
        quoted_list(tracked),
        placeholders(tracked.len() + 2),
    );
    let key_text = key.as_str();
    let values = attribute_values(kind, attributes);
    let mut params: Vec<&dyn ToSql> = vec![&key_text];
    params.extend(values.iter().map(|value| value as &dyn ToSql));
    params.push(&valid_from);
    conn.execute(&sql, params.as_slice())?;
    Ok(SurrogateId(conn.last_insert_rowid()))
}

/// Conflict-aware insert-or-update used by catalog dimensions.
fn upsert_catalog_row(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    key: &NaturalKey,
    attributes: &Attributes,
    valid_from: NaiveDateTime,
) -> Result<()> {
    let tracked = kind.tracked_attributes();
    let updates = tracked
        .iter()
        .map(|name| format!("\"{name}\" = excluded.\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" (natural_key, {}, valid_from, is_current) VALUES ({}, 1) \
         ON CONFLICT (natural_key) WHERE is_current = 1 DO UPDATE SET {updates}",
        names.dimension_table(kind),
        quoted_list(tracked),
        placeholders(tracked.len() + 2),
    );
    let key_text = key.as_str();
    let values = attribute_values(kind, attributes);
    let mut params: Vec<&dyn ToSql> = vec![&key_text];
    params.extend(values.iter().map(|value| value as &dyn ToSql));
    params.push(&valid_from);
    conn.execute(&sql, params.as_slice())?;
    Ok(())
}

fn close_version(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    id: SurrogateId,
    at: NaiveDateTime,
) -> Result<()> {
    let table = names.dimension_table(kind);
    let sql = format!(
        "UPDATE \"{table}\" SET valid_to = ?1, is_current = 0 WHERE surrogate_id = ?2 AND is_current = 1"
    );
    let changed = conn.execute(&sql, params![at, id.get()])?;
    if changed != 1 {
        return Err(StoreError::Corrupt {
            table,
            reason: format!("current version {id} could not be closed"),
        });
    }
    Ok(())
}

/// Reads the current version and applies the plan. Callers hold the
/// connection lock and an open transaction.
fn apply_upsert(
    conn: &Connection,
    names: &SchemaNames,
    kind: DimensionKind,
    key: &NaturalKey,
    attributes: &Attributes,
    now: NaiveDateTime,
) -> Result<UpsertOutcome> {
    let current = current_version(conn, names, kind, key)?;
    let outcome = match plan_upsert(kind, current.as_ref(), attributes, now) {
        UpsertPlan::Insert { valid_from } => {
            let surrogate_id = match kind.versioning() {
                Versioning::Scd2 => insert_version(conn, names, kind, key, attributes, valid_from)?,
                Versioning::Overwrite => {
                    upsert_catalog_row(conn, names, kind, key, attributes, valid_from)?;
                    SurrogateId(conn.last_insert_rowid())
                }
            };
            UpsertOutcome {
                surrogate_id,
                action: UpsertAction::Inserted,
            }
        }
        UpsertPlan::Unchanged(surrogate_id) => UpsertOutcome {
            surrogate_id,
            action: UpsertAction::Unchanged,
        },
        UpsertPlan::Version { close, at } => {
            close_version(conn, names, kind, close, at)?;
            debug!(%kind, key = %Redacted(key), closed = %close, "dimension version closed");
            UpsertOutcome {
                surrogate_id: insert_version(conn, names, kind, key, attributes, at)?,
                action: UpsertAction::Versioned { closed: close },
            }
        }
        UpsertPlan::Overwrite(surrogate_id) => {
            upsert_catalog_row(conn, names, kind, key, attributes, now)?;
            UpsertOutcome {
                surrogate_id,
                action: UpsertAction::Overwritten,
            }
        }
    };
    Ok(outcome)
}

impl DimensionStore for SqliteWarehouse {
    fn resolve_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
    ) -> Result<Option<DimensionVersion>> {
        let conn = self.conn()?;
        current_version(&conn, &self.names, kind, key)
    }

    fn upsert(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        attributes: &Attributes,
        now: NaiveDateTime,
    ) -> Result<UpsertOutcome> {
        let prepared = prepare_attributes(kind, attributes)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_upsert(&tx, &self.names, kind, key, &prepared, now)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn upsert_batch(
        &self,
        kind: DimensionKind,
        rows: &[(NaturalKey, Attributes)],
        now: NaiveDateTime,
    ) -> Result<Vec<UpsertOutcome>> {
        let prepared = rows
            .iter()
            .map(|(key, attributes)| Ok((key, prepare_attributes(kind, attributes)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcomes = prepared
            .iter()
            .map(|(key, attributes)| apply_upsert(&tx, &self.names, kind, key, attributes, now))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(outcomes)
    }

    fn ensure_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        now: NaiveDateTime,
    ) -> Result<SurrogateId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = match current_version(&tx, &self.names, kind, key)? {
            Some(current) => current.surrogate_id,
            None => {
                debug!(%kind, key = %Redacted(key), "created minimal dimension row");
                insert_version(&tx, &self.names, kind, key, &kind.empty_attributes(), now)?
            }
        };
        tx.commit()?;
        Ok(id)
    }

    fn versions(&self, kind: DimensionKind, key: &NaturalKey) -> Result<Vec<DimensionVersion>> {
        let conn = self.conn()?;
        let key_text = key.as_str();
        query_versions(&conn, &self.names, kind, "WHERE natural_key = ?1", &[&key_text])
    }

    fn current_rows(&self, kind: DimensionKind) -> Result<Vec<DimensionVersion>> {
        let conn = self.conn()?;
        query_versions(&conn, &self.names, kind, "WHERE is_current = 1", &[])
    }
}

// === Staging ===

fn staging_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for name in names {
        let name = name?;
        if name != LOAD_TS_COLUMN {
            columns.push(name);
        }
    }
    Ok(columns)
}

impl StagingStore for SqliteWarehouse {
    fn ensure_staging_table(&self, table: &str, columns: &[String]) -> Result<()> {
        check_identifier(table)?;
        for column in columns {
            check_identifier(column)?;
            if column == LOAD_TS_COLUMN {
                return Err(StoreError::InvalidIdentifier(column.clone()));
            }
        }
        let physical = self.names.staging_table(table);
        let conn = self.conn()?;
        let existing = staging_columns(&conn, &physical)?;
        if existing.is_empty() {
            conn.execute_batch(&staging_ddl(&physical, columns))?;
            debug!(table = %physical, columns = columns.len(), "staging table created");
            return Ok(());
        }
        let added: Vec<String> = columns
            .iter()
            .filter(|column| !existing.contains(column))
            .cloned()
            .collect();
        if added.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaDrift {
                table: table.to_string(),
                added,
            })
        }
    }

    fn bulk_load(&self, source: &SourceTable) -> Result<usize> {
        self.ensure_staging_table(&source.name, &source.columns)?;
        let physical = self.names.staging_table(&source.name);
        let mut column_names: Vec<&str> = source.columns.iter().map(String::as_str).collect();
        column_names.push(LOAD_TS_COLUMN);
        let sql = format!(
            "INSERT INTO \"{physical}\" ({}) VALUES ({})",
            quoted_list(&column_names),
            placeholders(column_names.len()),
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in &source.records {
                let cells: Vec<Option<&str>> = source
                    .columns
                    .iter()
                    .map(|column| record.raw(column))
                    .collect();
                let loaded_at = record.ingested_at();
                let mut params: Vec<&dyn ToSql> =
                    cells.iter().map(|cell| cell as &dyn ToSql).collect();
                params.push(&loaded_at);
                stmt.execute(params.as_slice())?;
            }
        }
        tx.commit()?;
        debug!(table = %physical, rows = source.len(), "staging rows appended");
        Ok(source.len())
    }

    fn read_staging(&self, table: &str) -> Result<SourceTable> {
        check_identifier(table)?;
        let physical = self.names.staging_table(table);
        let conn = self.conn()?;
        let columns = staging_columns(&conn, &physical)?;
        if columns.is_empty() {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        let sql = format!(
            "SELECT {}, \"{LOAD_TS_COLUMN}\" FROM \"{physical}\" ORDER BY rowid",
            quoted_list(&column_refs),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let mut values = BTreeMap::new();
            for (i, column) in columns.iter().enumerate() {
                if let Some(value) = row.get::<_, Option<String>>(i)? {
                    values.insert(column.clone(), value);
                }
            }
            let loaded_at: NaiveDateTime = row.get(columns.len())?;
            Ok((values, loaded_at))
        })?;

        let mut staged = SourceTable::new(table, columns.clone());
        for row in rows {
            let (values, loaded_at) = row?;
            staged.records.push(RawRecord::new(values, loaded_at, table));
        }
        Ok(staged)
    }

    fn staging_tables(&self) -> Result<Vec<String>> {
        let prefix = self.names.staging_prefix();
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tables = Vec::new();
        for name in names {
            if let Some(table) = name?.strip_prefix(&prefix) {
                tables.push(table.to_string());
            }
        }
        Ok(tables)
    }
}

// === Facts ===

impl FactSink for SqliteWarehouse {
    fn append_facts(&self, facts: &[FactEvent]) -> Result<usize> {
        let names = &self.names;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut dates = tx.prepare(&format!(
                "INSERT OR IGNORE INTO \"{}\" (fecha_id, fecha, anio, mes, dia) VALUES (?1, ?2, ?3, ?4, ?5)",
                names.date_table()
            ))?;
            let mut equipment = tx.prepare(&format!(
                "INSERT INTO \"{}\" (equipo_id, paciente_id, aseguradora_id, fecha_id) VALUES (?1, ?2, ?3, ?4)",
                names.fact_table(FactKind::Equipment)
            ))?;
            let mut service = tx.prepare(&format!(
                "INSERT INTO \"{}\" (pedido_id, paciente_id, aseguradora_id, medicamento_id, fecha_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                names.fact_table(FactKind::ServiceRequest)
            ))?;

            for fact in facts {
                let date = fact.date();
                dates.execute(params![date.as_int(), date.date, date.year, date.month, date.day])?;
                match fact {
                    FactEvent::Equipment(event) => {
                        equipment.execute(params![
                            event.equipment_id.get(),
                            event.patient_id.get(),
                            event.insurer_id.map(SurrogateId::get),
                            date.as_int(),
                        ])?;
                    }
                    FactEvent::ServiceRequest(event) => {
                        service.execute(params![
                            event.order_id.get(),
                            event.patient_id.get(),
                            event.insurer_id.map(SurrogateId::get),
                            event.medication_id.get(),
                            date.as_int(),
                        ])?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(facts.len())
    }

    fn fact_count(&self, kind: FactKind) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.names.fact_table(kind)),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

// === Run ledger ===

impl RunLedger for SqliteWarehouse {
    fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (proceso, detalle, filas, estado, registrado) VALUES (?1, ?2, ?3, ?4, ?5)",
                self.names.ledger_table()
            ),
            params![
                entry.process_name,
                entry.detail,
                i64::try_from(entry.row_count).unwrap_or(i64::MAX),
                entry.status.as_str(),
                entry.recorded_at,
            ],
        )?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT proceso, detalle, filas, estado, registrado FROM \"{}\" ORDER BY log_id",
            self.names.ledger_table()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, NaiveDateTime>(4)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (process_name, detail, filas, estado, recorded_at) = row?;
            entries.push(LedgerEntry {
                process_name,
                detail,
                row_count: u64::try_from(filas).unwrap_or_default(),
                status: estado.parse::<RunStatus>()?,
                recorded_at,
            });
        }
        Ok(entries)
    }
}

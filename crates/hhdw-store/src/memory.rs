//! In-process warehouse.
//!
//! Each table family sits behind its own mutex. Dimension upserts hold the
//! dimension lock from the current-version read through the write, which is
//! what keeps a key at one current version under concurrent callers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use tracing::debug;

use hhdw_model::{
    Attributes, DateKey, DimensionKind, DimensionVersion, FactEvent, FactKind, LedgerEntry,
    NaturalKey, Redacted, SourceTable, SurrogateId,
};

use crate::error::{Result, StoreError};
use crate::scd2::{
    UpsertAction, UpsertOutcome, UpsertPlan, plan_upsert, prepare_attributes, single_current,
};
use crate::{DimensionStore, FactSink, RunLedger, StagingStore, check_identifier};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

#[derive(Debug, Default)]
struct Dimensions {
    rows: BTreeMap<DimensionKind, Vec<DimensionVersion>>,
}

impl Dimensions {
    fn table(&self, kind: DimensionKind) -> &[DimensionVersion] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn current(&self, kind: DimensionKind, key: &NaturalKey) -> Result<Option<DimensionVersion>> {
        let current = self
            .table(kind)
            .iter()
            .filter(|row| row.is_current && row.natural_key == *key)
            .cloned()
            .collect();
        single_current(kind, key.as_str(), current)
    }

    /// Surrogate ids are positions in the per-kind table, starting at 1.
    fn push(
        &mut self,
        kind: DimensionKind,
        key: &NaturalKey,
        attributes: Attributes,
        valid_from: NaiveDateTime,
    ) -> SurrogateId {
        let table = self.rows.entry(kind).or_default();
        let id = SurrogateId(table.len() as i64 + 1);
        table.push(DimensionVersion {
            surrogate_id: id,
            kind,
            natural_key: key.clone(),
            attributes,
            valid_from,
            valid_to: None,
            is_current: true,
        });
        id
    }

    fn row_mut(&mut self, kind: DimensionKind, id: SurrogateId) -> Result<&mut DimensionVersion> {
        self.rows
            .get_mut(&kind)
            .and_then(|table| table.iter_mut().find(|row| row.surrogate_id == id))
            .ok_or_else(|| StoreError::Corrupt {
                table: kind.table_name().to_string(),
                reason: format!("surrogate id {id} vanished"),
            })
    }

    fn apply(
        &mut self,
        kind: DimensionKind,
        key: &NaturalKey,
        attributes: Attributes,
        now: NaiveDateTime,
    ) -> Result<UpsertOutcome> {
        let current = self.current(kind, key)?;
        let outcome = match plan_upsert(kind, current.as_ref(), &attributes, now) {
            UpsertPlan::Insert { valid_from } => UpsertOutcome {
                surrogate_id: self.push(kind, key, attributes, valid_from),
                action: UpsertAction::Inserted,
            },
            UpsertPlan::Unchanged(id) => UpsertOutcome {
                surrogate_id: id,
                action: UpsertAction::Unchanged,
            },
            UpsertPlan::Version { close, at } => {
                let row = self.row_mut(kind, close)?;
                row.valid_to = Some(at);
                row.is_current = false;
                debug!(%kind, key = %Redacted(key), closed = %close, "dimension version closed");
                UpsertOutcome {
                    surrogate_id: self.push(kind, key, attributes, at),
                    action: UpsertAction::Versioned { closed: close },
                }
            }
            UpsertPlan::Overwrite(id) => {
                self.row_mut(kind, id)?.attributes = attributes;
                UpsertOutcome {
                    surrogate_id: id,
                    action: UpsertAction::Overwritten,
                }
            }
        };
        Ok(outcome)
    }
}

/// Warehouse kept entirely in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    staging: Mutex<BTreeMap<String, SourceTable>>,
    dimensions: Mutex<Dimensions>,
    facts: Mutex<Vec<FactEvent>>,
    dates: Mutex<BTreeSet<DateKey>>,
    ledger: Mutex<Vec<LedgerEntry>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar rows referenced by appended facts.
    pub fn dates(&self) -> Result<Vec<DateKey>> {
        Ok(lock(&self.dates)?.iter().copied().collect())
    }

    pub fn facts(&self) -> Result<Vec<FactEvent>> {
        Ok(lock(&self.facts)?.clone())
    }
}

impl StagingStore for MemoryWarehouse {
    fn ensure_staging_table(&self, table: &str, columns: &[String]) -> Result<()> {
        check_identifier(table)?;
        for column in columns {
            check_identifier(column)?;
        }
        let mut staging = lock(&self.staging)?;
        match staging.get(table) {
            Some(existing) => {
                let added: Vec<String> = columns
                    .iter()
                    .filter(|column| !existing.has_column(column))
                    .cloned()
                    .collect();
                if !added.is_empty() {
                    return Err(StoreError::SchemaDrift {
                        table: table.to_string(),
                        added,
                    });
                }
            }
            None => {
                staging.insert(table.to_string(), SourceTable::new(table, columns.to_vec()));
            }
        }
        Ok(())
    }

    fn bulk_load(&self, source: &SourceTable) -> Result<usize> {
        self.ensure_staging_table(&source.name, &source.columns)?;
        let mut staging = lock(&self.staging)?;
        let table = staging
            .get_mut(&source.name)
            .ok_or_else(|| StoreError::UnknownTable(source.name.clone()))?;
        table.records.extend(source.records.iter().cloned());
        debug!(table = %source.name, rows = source.len(), "staging rows appended");
        Ok(source.len())
    }

    fn read_staging(&self, table: &str) -> Result<SourceTable> {
        lock(&self.staging)?
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn staging_tables(&self) -> Result<Vec<String>> {
        Ok(lock(&self.staging)?.keys().cloned().collect())
    }
}

impl DimensionStore for MemoryWarehouse {
    fn resolve_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
    ) -> Result<Option<DimensionVersion>> {
        lock(&self.dimensions)?.current(kind, key)
    }

    fn upsert(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        attributes: &Attributes,
        now: NaiveDateTime,
    ) -> Result<UpsertOutcome> {
        let prepared = prepare_attributes(kind, attributes)?;
        lock(&self.dimensions)?.apply(kind, key, prepared, now)
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
        let mut dimensions = lock(&self.dimensions)?;
        prepared
            .into_iter()
            .map(|(key, attributes)| dimensions.apply(kind, key, attributes, now))
            .collect()
    }

    fn ensure_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        now: NaiveDateTime,
    ) -> Result<SurrogateId> {
        let mut dimensions = lock(&self.dimensions)?;
        if let Some(current) = dimensions.current(kind, key)? {
            return Ok(current.surrogate_id);
        }
        debug!(%kind, key = %Redacted(key), "created minimal dimension row");
        Ok(dimensions.push(kind, key, kind.empty_attributes(), now))
    }

    fn versions(&self, kind: DimensionKind, key: &NaturalKey) -> Result<Vec<DimensionVersion>> {
        Ok(lock(&self.dimensions)?
            .table(kind)
            .iter()
            .filter(|row| row.natural_key == *key)
            .cloned()
            .collect())
    }

    fn current_rows(&self, kind: DimensionKind) -> Result<Vec<DimensionVersion>> {
        Ok(lock(&self.dimensions)?
            .table(kind)
            .iter()
            .filter(|row| row.is_current)
            .cloned()
            .collect())
    }
}

impl FactSink for MemoryWarehouse {
    fn append_facts(&self, facts: &[FactEvent]) -> Result<usize> {
        let mut dates = lock(&self.dates)?;
        let mut table = lock(&self.facts)?;
        dates.extend(facts.iter().map(FactEvent::date));
        table.extend(facts.iter().cloned());
        Ok(facts.len())
    }

    fn fact_count(&self, kind: FactKind) -> Result<usize> {
        Ok(lock(&self.facts)?
            .iter()
            .filter(|fact| fact.kind() == kind)
            .count())
    }
}

impl RunLedger for MemoryWarehouse {
    fn record(&self, entry: &LedgerEntry) -> Result<()> {
        lock(&self.ledger)?.push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(lock(&self.ledger)?.clone())
    }
}

//! Warehouse storage.
//!
//! - **scd2**: pure versioning decisions shared by every backend
//! - **memory**: in-process store used by tests and dry runs
//! - **sqlite**: file-backed store (feature `sqlite`, on by default)
//!
//! Every backend serializes dimension upserts so that a natural key never has
//! more than one current version, and exposes facts and the run ledger as
//! append-only.

pub mod error;
pub mod memory;
pub mod scd2;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::NaiveDateTime;

use hhdw_model::{
    Attributes, DimensionKind, DimensionVersion, FactEvent, FactKind, LedgerEntry, NaturalKey,
    SourceTable, SurrogateId,
};

pub use error::{Result, StoreError};
pub use memory::MemoryWarehouse;
pub use scd2::{UpsertAction, UpsertOutcome, UpsertPlan, plan_upsert};
#[cfg(feature = "sqlite")]
pub use sqlite::{SchemaNames, SqliteWarehouse};

/// Raw copies of source tables, one staging table per source.
pub trait StagingStore: Send + Sync {
    /// Creates the staging table if absent.
    ///
    /// An existing table is never altered: columns it lacks are reported as
    /// [`StoreError::SchemaDrift`].
    fn ensure_staging_table(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Appends every record of `source` to its staging table, stamping each
    /// row with the record's ingestion timestamp. Returns rows written.
    fn bulk_load(&self, source: &SourceTable) -> Result<usize>;

    /// Reads a staging table back in load order.
    fn read_staging(&self, table: &str) -> Result<SourceTable>;

    fn staging_tables(&self) -> Result<Vec<String>>;
}

/// Versioned and catalog dimensions.
pub trait DimensionStore: Send + Sync {
    /// Returns the current version for a natural key.
    fn resolve_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
    ) -> Result<Option<DimensionVersion>>;

    /// Inserts, versions or overwrites according to the kind's versioning.
    ///
    /// The read of the current version and the write that follows happen
    /// under one lock, so concurrent upserts of the same key serialize.
    fn upsert(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        attributes: &Attributes,
        now: NaiveDateTime,
    ) -> Result<UpsertOutcome>;

    fn upsert_batch(
        &self,
        kind: DimensionKind,
        rows: &[(NaturalKey, Attributes)],
        now: NaiveDateTime,
    ) -> Result<Vec<UpsertOutcome>> {
        rows.iter()
            .map(|(key, attributes)| self.upsert(kind, key, attributes, now))
            .collect()
    }

    /// Returns the current surrogate id, creating a minimal version with
    /// every attribute unset when the key is unknown.
    fn ensure_current(
        &self,
        kind: DimensionKind,
        key: &NaturalKey,
        now: NaiveDateTime,
    ) -> Result<SurrogateId>;

    /// Every version of a key, oldest first.
    fn versions(&self, kind: DimensionKind, key: &NaturalKey) -> Result<Vec<DimensionVersion>>;

    fn current_rows(&self, kind: DimensionKind) -> Result<Vec<DimensionVersion>>;
}

/// Append-only fact tables. There is no update or delete path.
pub trait FactSink: Send + Sync {
    /// Appends all facts atomically and makes sure each referenced date row
    /// exists. Returns rows appended.
    fn append_facts(&self, facts: &[FactEvent]) -> Result<usize>;

    fn fact_count(&self, kind: FactKind) -> Result<usize>;
}

/// Append-only log of stage outcomes.
pub trait RunLedger: Send + Sync {
    fn record(&self, entry: &LedgerEntry) -> Result<()>;

    fn entries(&self) -> Result<Vec<LedgerEntry>>;
}

/// Everything the pipeline needs from a backend.
pub trait Warehouse: StagingStore + DimensionStore + FactSink + RunLedger {}

impl<T: StagingStore + DimensionStore + FactSink + RunLedger> Warehouse for T {}

/// Rejects identifiers that cannot be embedded in a table name as-is.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_restricted() {
        assert!(check_identifier("equipos_entregados").is_ok());
        assert!(check_identifier("no_pedido_2").is_ok());
        assert!(check_identifier("").is_err());
        assert!(check_identifier("x; DROP TABLE y").is_err());
        assert!(check_identifier("name\"").is_err());
    }
}

//! Error types for warehouse storage.

use hhdw_model::{DimensionKind, ModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// More than one current version exists for a natural key. Upserts are
    /// serialized so this only surfaces if the store was modified externally.
    #[error("versioning conflict: {current} current versions of {kind} '{key}'")]
    VersioningConflict {
        kind: DimensionKind,
        key: String,
        current: usize,
    },

    /// A source brought columns its existing staging table does not have.
    #[error("staging table '{table}' would need new columns {added:?}")]
    SchemaDrift { table: String, added: Vec<String> },

    #[error("staging table '{0}' does not exist")]
    UnknownTable(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("attribute '{attribute}' is not tracked by {kind}")]
    UnknownAttribute {
        kind: DimensionKind,
        attribute: String,
    },

    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: String, reason: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

//! Pipeline configuration.
//!
//! Loaded from a TOML file; every section is optional and falls back to the
//! defaults below. The database location can be overridden from the
//! environment ([`DATABASE_ENV`]) or by the caller, in that order of
//! increasing precedence.
//!
//! ```toml
//! [storage]
//! backend = "sqlite"
//! database = "warehouse.db"
//!
//! [resolver]
//! fuzzy_threshold = 85
//! unresolved = "drop"
//!
//! [[sources]]
//! table = "equipos_entregados"
//! path = "exports/equipos.csv"
//! feeds = ["equipment", "equipment_fact"]
//!
//! [roles.equipment]
//! equipment_key = ["^placa$", "serial"]
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use hhdw_map::{ResolverOptions, RoleGroup, RoleOverrides};
use hhdw_store::SchemaNames;

/// Environment variable that overrides `storage.database`.
pub const DATABASE_ENV: &str = "HHDW_DATABASE";

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_EXCLUDE_MARKER: &str = "demo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// SQLite file. Required for the sqlite backend.
    pub database: Option<PathBuf>,
    pub staging_schema: String,
    pub warehouse_schema: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let names = SchemaNames::default();
        Self {
            backend: Backend::default(),
            database: None,
            staging_schema: names.staging,
            warehouse_schema: names.warehouse,
        }
    }
}

impl StorageConfig {
    pub fn schema_names(&self) -> SchemaNames {
        SchemaNames {
            staging: self.staging_schema.clone(),
            warehouse: self.warehouse_schema.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows whose patient identifier contains this text (any case) are
    /// treated as test records and never staged. `None` disables the filter.
    pub exclude_marker: Option<String>,
    /// Sources read concurrently during staging.
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            exclude_marker: Some(DEFAULT_EXCLUDE_MARKER.to_string()),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// One exported file and the consumers that read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Staging table name; also tags every record read from the file.
    pub table: String,
    pub path: PathBuf,
    #[serde(default)]
    pub feeds: Vec<RoleGroup>,
}

impl SourceConfig {
    pub fn feeds(&self, group: RoleGroup) -> bool {
        self.feeds.contains(&group)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub resolver: ResolverOptions,
    pub ingest: IngestConfig,
    pub sources: Vec<SourceConfig>,
    /// `[roles.<group>]` tables replacing built-in role patterns.
    pub roles: RoleOverrides,
}

impl PipelineConfig {
    /// Parses TOML text. Relative source paths are resolved against `base_dir`.
    pub fn parse(text: &str, origin: &Path, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source,
        })?;
        for source in &mut config.sources {
            if source.path.is_relative() {
                source.path = base_dir.join(&source.path);
            }
        }
        if let Some(database) = config.storage.database.as_mut()
            && database.is_relative()
        {
            *database = base_dir.join(&*database);
        }
        Ok(config)
    }

    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::parse(&text, path, base_dir)?;
        debug!(path = %path.display(), sources = config.sources.len(), "config loaded");
        Ok(config)
    }

    /// Applies [`DATABASE_ENV`] when set.
    pub fn with_env_overrides(self) -> Self {
        let database = std::env::var_os(DATABASE_ENV).map(PathBuf::from);
        self.with_database(database)
    }

    /// Replaces the database location when `database` is `Some`.
    pub fn with_database(mut self, database: Option<PathBuf>) -> Self {
        if let Some(database) = database {
            self.storage.database = Some(database);
        }
        self
    }

    /// Checks everything that can be checked without touching files.
    pub fn validate(&self) -> Result<()> {
        self.storage
            .schema_names()
            .validate()
            .map_err(|e| ConfigError::invalid(format!("storage: {e}")))?;
        if self.storage.backend == Backend::Sqlite && self.storage.database.is_none() {
            return Err(ConfigError::invalid(format!(
                "storage.database is required for the sqlite backend (or set {DATABASE_ENV})"
            )));
        }
        if self.ingest.workers == 0 {
            return Err(ConfigError::invalid("ingest.workers must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.resolver.fuzzy_threshold) {
            return Err(ConfigError::invalid(format!(
                "resolver.fuzzy_threshold {} is outside 0..=100",
                self.resolver.fuzzy_threshold
            )));
        }
        if self.resolver.partial_tokens == 0 {
            return Err(ConfigError::invalid("resolver.partial_tokens must be at least 1"));
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            let valid = !source.table.is_empty()
                && source
                    .table
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                return Err(ConfigError::invalid(format!(
                    "source table '{}' must be lowercase letters, digits and underscores",
                    source.table
                )));
            }
            if !seen.insert(source.table.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "source table '{}' is listed twice",
                    source.table
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hhdw_map::UnresolvedPolicy;

    const SAMPLE: &str = r#"
[storage]
database = "dw.sqlite"
warehouse_schema = "hhdw"

[resolver]
fuzzy_threshold = 90
unresolved = "pass-through"

[ingest]
exclude_marker = "prueba"

[[sources]]
table = "equipos_entregados"
path = "exports/equipos.csv"
feeds = ["equipment", "equipment_fact"]

[[sources]]
table = "maestro_medicamentos"
path = "/data/maestro.csv"
feeds = ["medication"]

[roles.equipment]
equipment_key = ["^placa$"]
"#;

    #[test]
    fn parses_sections_and_resolves_paths() {
        let config = PipelineConfig::parse(SAMPLE, Path::new("hhdw.toml"), Path::new("/etc/hhdw"))
            .expect("parse");
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert_eq!(
            config.storage.database.as_deref(),
            Some(Path::new("/etc/hhdw/dw.sqlite"))
        );
        assert_eq!(config.storage.schema_names().warehouse, "hhdw");
        assert_eq!(config.storage.schema_names().staging, "stg");
        assert_eq!(config.resolver.fuzzy_threshold, 90.0);
        assert_eq!(config.resolver.partial_tokens, 4);
        assert_eq!(config.resolver.unresolved, UnresolvedPolicy::PassThrough);
        assert_eq!(config.ingest.exclude_marker.as_deref(), Some("prueba"));
        assert_eq!(config.ingest.workers, DEFAULT_WORKERS);
        assert_eq!(
            config.sources[0].path,
            Path::new("/etc/hhdw/exports/equipos.csv")
        );
        assert_eq!(config.sources[1].path, Path::new("/data/maestro.csv"));
        assert!(config.sources[0].feeds(RoleGroup::EquipmentFact));
        assert_eq!(config.roles["equipment"]["equipment_key"], vec!["^placa$"]);
        config.validate().expect("valid");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config =
            PipelineConfig::parse("", Path::new("empty.toml"), Path::new(".")).expect("parse");
        assert_eq!(config, PipelineConfig::default());
        assert!(config.validate().is_err(), "sqlite without a database");
        let config = config.with_database(Some(PathBuf::from("x.db")));
        config.validate().expect("valid once a database is set");
    }

    #[test]
    fn rejects_bad_sources() {
        let mut config = PipelineConfig::parse(SAMPLE, Path::new("a.toml"), Path::new("."))
            .expect("parse");
        config.sources[1].table = "Equipos Entregados".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        config.sources[1].table = "equipos_entregados".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_feed_is_a_parse_error() {
        let text = "[[sources]]\ntable = \"x\"\npath = \"x.csv\"\nfeeds = [\"billing\"]\n";
        assert!(matches!(
            PipelineConfig::parse(text, Path::new("bad.toml"), Path::new(".")),
            Err(ConfigError::Toml { .. })
        ));
    }
}

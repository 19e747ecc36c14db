use anyhow::{Context, Result};
use tracing::info;

use hhdw_cli::inspect::{InspectReport, inspect_source};
use hhdw_core::{Backend, Pipeline, PipelineConfig, RunSummary};
use hhdw_map::RoleCatalog;
use hhdw_store::{MemoryWarehouse, SqliteWarehouse, Warehouse};

use crate::cli::{InspectArgs, RunArgs};

pub fn run_load(args: &RunArgs) -> Result<RunSummary> {
    let config = PipelineConfig::load(&args.config)?
        .with_env_overrides()
        .with_database(args.database.clone());
    config.validate()?;

    match config.storage.backend {
        Backend::Memory => {
            info!("using in-memory warehouse, nothing will persist");
            let store = MemoryWarehouse::new();
            run_with(&config, &store)
        }
        Backend::Sqlite => {
            let path = config
                .storage
                .database
                .as_deref()
                .context("storage.database is not set")?;
            let store = SqliteWarehouse::open(path, config.storage.schema_names())
                .with_context(|| format!("open warehouse {}", path.display()))?;
            run_with(&config, &store)
        }
    }
}

fn run_with<W: Warehouse>(config: &PipelineConfig, store: &W) -> Result<RunSummary> {
    Pipeline::new(config, store)?.run()
}

pub fn run_inspect(args: &InspectArgs) -> Result<InspectReport> {
    let catalog = match &args.config {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            RoleCatalog::with_overrides(&config.roles).context("compile role patterns")?
        }
        None => RoleCatalog::builtin().context("compile role patterns")?,
    };
    inspect_source(&args.file, &catalog)
}

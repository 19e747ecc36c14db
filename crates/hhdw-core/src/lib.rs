//! Warehouse load orchestration.
//!
//! - **config**: TOML pipeline configuration
//! - **dimensions**: per-dimension merge of every feeding source
//! - **facts**: reference resolution and fact assembly
//! - **ledger**: per-stage outcome recording
//! - **pipeline**: the staged run tying it all together

pub mod config;
pub mod dimensions;
pub mod facts;
pub mod ledger;
pub mod pipeline;

pub use config::{
    Backend, ConfigError, DATABASE_ENV, IngestConfig, PipelineConfig, SourceConfig, StorageConfig,
};
pub use dimensions::{DimensionBatch, DimensionReport, apply_batch, attribute_roles};
pub use facts::{AssemblyReport, FactAssembler, required_roles};
pub use ledger::RunRecorder;
pub use pipeline::{Pipeline, RunSummary, StagedSource, StagedSummary};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("natural key is empty after normalization (raw value: {raw:?})")]
    EmptyNaturalKey { raw: String },
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),
    #[error("unknown run status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

//! Error types for source ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a source file.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Source file not found.
    #[error("source file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Format Detection Errors ===
    /// Every (encoding, delimiter) combination was tried and none produced a table.
    #[error("no viable encoding/delimiter combination for {path} (tried: {})", attempts.join("; "))]
    NoViableFormat {
        path: PathBuf,
        attempts: Vec<String>,
    },
}

impl IngestError {
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::FileRead {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::FileNotFound {
            path: PathBuf::from("/data/equipos.csv"),
        };
        assert_eq!(err.to_string(), "source file not found: /data/equipos.csv");
    }

    #[test]
    fn test_no_viable_format_lists_attempts() {
        let err = IngestError::NoViableFormat {
            path: PathBuf::from("x.csv"),
            attempts: vec!["utf-8/auto: empty".to_string(), "utf-8/';': empty".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("utf-8/auto: empty; utf-8/';': empty"));
    }
}

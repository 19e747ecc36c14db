use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "OK",
            RunStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(RunStatus::Ok),
            "ERROR" => Ok(RunStatus::Error),
            _ => Err(ModelError::UnknownStatus(s.to_string())),
        }
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub process_name: String,
    pub detail: String,
    pub row_count: u64,
    pub status: RunStatus,
    pub recorded_at: NaiveDateTime,
}

impl LedgerEntry {
    pub fn new(
        process_name: impl Into<String>,
        detail: impl Into<String>,
        row_count: u64,
        status: RunStatus,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            detail: detail.into(),
            row_count,
            status,
            recorded_at: Local::now().naive_local(),
        }
    }

    pub fn ok(process_name: impl Into<String>, detail: impl Into<String>, row_count: u64) -> Self {
        Self::new(process_name, detail, row_count, RunStatus::Ok)
    }

    pub fn error(process_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(process_name, detail, 0, RunStatus::Error)
    }

    pub fn is_error(&self) -> bool {
        self.status == RunStatus::Error
    }
}

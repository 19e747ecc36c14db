use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::text::{fold_key, is_null_token};

/// Folded business identifier used to join independently processed sources.
///
/// Construction trims, strips accents, uppercases and collapses whitespace, so
/// `" eq-001 "` and `"EQ-001"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn new(raw: &str) -> Result<Self> {
        if is_null_token(raw) {
            return Err(ModelError::EmptyNaturalKey {
                raw: raw.to_string(),
            });
        }
        let folded = fold_key(raw);
        if folded.is_empty() {
            return Err(ModelError::EmptyNaturalKey {
                raw: raw.to_string(),
            });
        }
        Ok(Self(folded))
    }

    /// Folds an optional cell value, returning `None` for blanks.
    pub fn from_cell(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| Self::new(value).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NaturalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Store-generated identifier of one dimension version. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateId(pub i64);

impl SurrogateId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

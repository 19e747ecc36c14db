use std::fmt;

use serde::{Deserialize, Serialize};

/// Rung of the resolution ladder that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Partial,
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Partial => "partial",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A free-text value reconciled to a reference catalog code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub normalized_text: String,
    pub reference_code: String,
    pub method: MatchMethod,
    /// 0..=100. Exact and partial matches report 100.
    pub score: f64,
}

//! Fuzzy resolution of free-text values against a reference catalog.
//!
//! Values go through a fixed ladder, first success wins:
//!
//! 1. **Exact**: normalized text equals a normalized catalog name.
//! 2. **Partial**: the first N tokens of a catalog name all occur as
//!    substrings of the normalized text.
//! 3. **Fuzzy**: best token-sort similarity over the whole catalog, accepted
//!    at or above the threshold.
//!
//! The partial and fuzzy rungs scan every catalog entry per value. That is
//! fine for catalogs of a few thousand entries; larger catalogs would need
//! entries pre-bucketed by leading token.

mod normalize;

use std::collections::HashMap;

use rapidfuzz::distance::indel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hhdw_model::{MatchCandidate, MatchMethod, Redacted};

pub use normalize::{DEFAULT_STOPWORDS, TextNormalizer};

use crate::error::{MapError, Result};

pub const DEFAULT_PARTIAL_TOKENS: usize = 4;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 85.0;

/// What happens to rows whose text matches nothing in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedPolicy {
    /// Drop the row from fact assembly and count it.
    #[default]
    Drop,
    /// Keep the row, using the original text in place of a catalog code.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    pub partial_tokens: usize,
    pub fuzzy_threshold: f64,
    pub stopwords: Vec<String>,
    pub unresolved: UnresolvedPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            partial_tokens: DEFAULT_PARTIAL_TOKENS,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            stopwords: DEFAULT_STOPWORDS.iter().map(|w| (*w).to_string()).collect(),
            unresolved: UnresolvedPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(MatchCandidate),
    Unresolved { normalized_text: String },
}

impl Resolution {
    pub fn code(&self) -> Option<&str> {
        match self {
            Resolution::Matched(candidate) => Some(&candidate.reference_code),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn method(&self) -> Option<MatchMethod> {
        match self {
            Resolution::Matched(candidate) => Some(candidate.method),
            Resolution::Unresolved { .. } => None,
        }
    }
}

/// Per-rung tallies for a batch of resolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub exact: usize,
    pub partial: usize,
    pub fuzzy: usize,
    pub unresolved: usize,
}

impl ResolutionStats {
    pub fn record(&mut self, resolution: &Resolution) {
        match resolution.method() {
            Some(MatchMethod::Exact) => self.exact += 1,
            Some(MatchMethod::Partial) => self.partial += 1,
            Some(MatchMethod::Fuzzy) => self.fuzzy += 1,
            None => self.unresolved += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.exact + self.partial + self.fuzzy
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    code: String,
    normalized: String,
    leading_tokens: Vec<String>,
    sorted_tokens: String,
}

fn sort_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-order-insensitive similarity on a 0-100 scale.
pub fn token_sort_score(a: &str, b: &str) -> f64 {
    let a = sort_tokens(a);
    let b = sort_tokens(b);
    indel::normalized_similarity(a.chars(), b.chars()) * 100.0
}

/// Reference catalog plus the normalizer applied to both sides.
#[derive(Debug, Clone)]
pub struct FuzzyResolver {
    normalizer: TextNormalizer,
    entries: Vec<CatalogEntry>,
    exact: HashMap<String, usize>,
    options: ResolverOptions,
}

impl FuzzyResolver {
    /// Builds a resolver over `(code, canonical_name)` pairs.
    ///
    /// Entries whose name normalizes to nothing are skipped. When two names
    /// normalize identically, the first entry keeps the exact match.
    pub fn new<I, C, N>(catalog: I, options: ResolverOptions) -> Result<Self>
    where
        I: IntoIterator<Item = (C, N)>,
        C: Into<String>,
        N: AsRef<str>,
    {
        if !(0.0..=100.0).contains(&options.fuzzy_threshold) {
            return Err(MapError::InvalidThreshold(options.fuzzy_threshold));
        }
        if options.partial_tokens == 0 {
            return Err(MapError::InvalidPartialTokens);
        }
        let normalizer = TextNormalizer::new(&options.stopwords);

        let mut entries = Vec::new();
        let mut exact = HashMap::new();
        for (code, name) in catalog {
            let normalized = normalizer.normalize(name.as_ref());
            if normalized.is_empty() {
                continue;
            }
            let leading_tokens = normalized
                .split_whitespace()
                .take(options.partial_tokens)
                .map(str::to_string)
                .collect();
            let sorted_tokens = sort_tokens(&normalized);
            exact.entry(normalized.clone()).or_insert(entries.len());
            entries.push(CatalogEntry {
                code: code.into(),
                normalized,
                leading_tokens,
                sorted_tokens,
            });
        }
        debug!(entries = entries.len(), "reference catalog built");

        Ok(Self {
            normalizer,
            entries,
            exact,
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.options.unresolved
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Runs the exact, partial, fuzzy ladder for one value.
    pub fn resolve(&self, text: &str) -> Resolution {
        let normalized = self.normalizer.normalize(text);
        if normalized.is_empty() {
            return Resolution::Unresolved {
                normalized_text: normalized,
            };
        }
        let found = self
            .exact_match(&normalized)
            .or_else(|| self.partial_match(&normalized))
            .or_else(|| self.fuzzy_match(&normalized));
        match found {
            Some(candidate) => Resolution::Matched(candidate),
            None => Resolution::Unresolved {
                normalized_text: normalized,
            },
        }
    }

    fn candidate(
        &self,
        index: usize,
        normalized: &str,
        method: MatchMethod,
        score: f64,
    ) -> MatchCandidate {
        MatchCandidate {
            normalized_text: normalized.to_string(),
            reference_code: self.entries[index].code.clone(),
            method,
            score,
        }
    }

    fn exact_match(&self, normalized: &str) -> Option<MatchCandidate> {
        self.exact
            .get(normalized)
            .map(|&index| self.candidate(index, normalized, MatchMethod::Exact, 100.0))
    }

    fn partial_match(&self, normalized: &str) -> Option<MatchCandidate> {
        self.entries
            .iter()
            .position(|entry| {
                entry
                    .leading_tokens
                    .iter()
                    .all(|token| normalized.contains(token.as_str()))
            })
            .map(|index| self.candidate(index, normalized, MatchMethod::Partial, 100.0))
    }

    fn fuzzy_match(&self, normalized: &str) -> Option<MatchCandidate> {
        let sorted = sort_tokens(normalized);
        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let score =
                indel::normalized_similarity(sorted.chars(), entry.sorted_tokens.chars()) * 100.0;
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((index, score));
            }
        }
        let (index, score) = best?;
        if score >= self.options.fuzzy_threshold {
            Some(self.candidate(index, normalized, MatchMethod::Fuzzy, score))
        } else {
            debug!(
                best_match = %Redacted(&self.entries[index].normalized),
                score,
                "fuzzy match below threshold"
            );
            None
        }
    }
}

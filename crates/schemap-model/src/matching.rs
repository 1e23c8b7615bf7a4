use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{ColumnRef, MethodName};
use crate::options::MethodWeights;

/// Rounds a score to 4 decimal digits.
pub fn round_score(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// How a column's best match was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchSource {
    /// Top weighted ensemble candidate.
    #[serde(rename = "ensemble")]
    Ensemble,
    /// Arbitration picked one of the offered candidates.
    #[serde(rename = "ensemble+llm")]
    EnsembleLlm,
    /// Arbitration named a candidate that was not offered.
    #[serde(rename = "ensemble_fallback_invalid_llm")]
    FallbackInvalidLlm,
    /// Arbitration call failed (timeout, transport, unparsable).
    #[serde(rename = "ensemble_fallback_llm_error")]
    FallbackLlmError,
    /// No method proposed any candidate.
    #[serde(rename = "none")]
    Unmatched,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ensemble => "ensemble",
            Self::EnsembleLlm => "ensemble+llm",
            Self::FallbackInvalidLlm => "ensemble_fallback_invalid_llm",
            Self::FallbackLlmError => "ensemble_fallback_llm_error",
            Self::Unmatched => "none",
        }
    }

    /// True for the two tags that record an arbitration fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackInvalidLlm | Self::FallbackLlmError)
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate with its normalized per-method scores and weighted total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: ColumnRef,
    /// Normalized (0..=1) score per method, rounded to 4 decimals.
    pub method_scores: BTreeMap<MethodName, f64>,
    /// Weighted sum of normalized scores, rounded to 4 decimals.
    pub final_score: f64,
}

/// Outcome of matching one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatchResult {
    pub source: ColumnRef,
    pub best_match: Option<ColumnRef>,
    pub confidence: f64,
    pub match_source: MatchSource,
    /// Every candidate, best first.
    pub candidates: Vec<RankedCandidate>,
}

impl ColumnMatchResult {
    /// Result for a source column nobody proposed a candidate for.
    pub fn unmatched(source: ColumnRef) -> Self {
        Self {
            source,
            best_match: None,
            confidence: 0.0,
            match_source: MatchSource::Unmatched,
            candidates: Vec::new(),
        }
    }
}

/// Loosely-typed column match as read back from an exported report.
///
/// Used when re-aggregating results produced elsewhere; ids are validated
/// by the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMatchRecord {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub best_match: Option<String>,
    /// Missing or null counts as 0.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub match_source: Option<String>,
}

/// Table-level match rolled up from column matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMatchResult {
    pub source_table: String,
    pub best_match_table: Option<String>,
    /// Mean confidence of every column in the group, rounded to 4 decimals.
    pub confidence: f64,
    pub column_match_count: usize,
}

/// Everything one matching run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub weights: MethodWeights,
    pub column_match_count: usize,
    pub table_match_count: usize,
    pub column_matches: Vec<ColumnMatchResult>,
    pub table_matches: Vec<TableMatchResult>,
    /// True if the run was cancelled before every column was ranked.
    #[serde(default)]
    pub cancelled: bool,
}

impl MatchReport {
    /// Counts column results per match source tag.
    pub fn count_by_source(&self) -> BTreeMap<MatchSource, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.column_matches {
            *counts.entry(result.match_source).or_insert(0) += 1;
        }
        counts
    }
}

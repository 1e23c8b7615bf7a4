//! Raw retrieval-method output and the merged per-source candidate scores.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ColumnRef, MethodName};

/// Output of one retrieval method for a whole source schema.
///
/// Ids and scores are kept raw here; they are validated when the collector
/// merges them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResults {
    pub method: MethodName,
    #[serde(default)]
    pub matches: Vec<MethodMatch>,
}

impl MethodResults {
    pub fn new(method: MethodName) -> Self {
        Self {
            method,
            matches: Vec::new(),
        }
    }
}

/// One source column's result from a method: a single best match, a ranked
/// candidate list, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodMatch {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<ScoredTarget>,
}

impl MethodMatch {
    pub fn top1(source: &str, best_match: &str, score: f64) -> Self {
        Self {
            source: Some(source.to_string()),
            best_match: Some(best_match.to_string()),
            score: Some(score),
            candidates: Vec::new(),
        }
    }

    pub fn top_k<'a>(source: &str, candidates: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            source: Some(source.to_string()),
            best_match: None,
            score: None,
            candidates: candidates
                .into_iter()
                .map(|(target, score)| ScoredTarget {
                    target: Some(target.to_string()),
                    score: Some(score),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoredTarget {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Per-method raw scores for every candidate proposed for one source column.
///
/// Missing method entries count as 0. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScoreSet {
    source: ColumnRef,
    candidates: BTreeMap<ColumnRef, BTreeMap<MethodName, f64>>,
}

impl CandidateScoreSet {
    pub fn new(
        source: ColumnRef,
        candidates: BTreeMap<ColumnRef, BTreeMap<MethodName, f64>>,
    ) -> Self {
        Self { source, candidates }
    }

    pub fn empty(source: ColumnRef) -> Self {
        Self::new(source, BTreeMap::new())
    }

    pub fn source(&self) -> &ColumnRef {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Candidates in lexical id order.
    pub fn candidates(&self) -> impl Iterator<Item = &ColumnRef> {
        self.candidates.keys()
    }

    pub fn scores_for(&self, candidate: &ColumnRef) -> Option<&BTreeMap<MethodName, f64>> {
        self.candidates.get(candidate)
    }

    /// Raw score of `method` for `candidate`, 0 when absent.
    pub fn score(&self, candidate: &ColumnRef, method: &MethodName) -> f64 {
        self.candidates
            .get(candidate)
            .and_then(|scores| scores.get(method))
            .copied()
            .unwrap_or(0.0)
    }

    /// Every method that scored at least one candidate.
    pub fn methods(&self) -> BTreeSet<&MethodName> {
        self.candidates
            .values()
            .flat_map(BTreeMap::keys)
            .collect()
    }
}

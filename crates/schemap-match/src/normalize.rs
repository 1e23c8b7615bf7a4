//! Per-method max normalization.
//!
//! Raw scales differ between methods (unbounded BM25 vs. cosine similarity),
//! so each method's scores are rescaled to 0..=1 on their own before any
//! weighting happens.

use std::collections::{BTreeMap, BTreeSet};

use schemap_model::{CandidateScoreSet, ColumnRef, MethodName};

/// Divides every score by the maximum. A maximum of 0 or less (or an empty
/// slice) yields all zeros.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 || !max.is_finite() {
        return vec![0.0; scores.len()];
    }
    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                (score / max).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// A [`CandidateScoreSet`] with each method's column max-normalized.
///
/// Every candidate carries an entry for every method present in the set.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedScoreSet {
    source: ColumnRef,
    methods: BTreeSet<MethodName>,
    scores: BTreeMap<ColumnRef, BTreeMap<MethodName, f64>>,
}

impl NormalizedScoreSet {
    pub fn from_candidates(set: &CandidateScoreSet) -> Self {
        let candidates: Vec<&ColumnRef> = set.candidates().collect();
        let methods: BTreeSet<MethodName> = set.methods().into_iter().cloned().collect();
        let mut scores: BTreeMap<ColumnRef, BTreeMap<MethodName, f64>> = candidates
            .iter()
            .map(|c| ((*c).clone(), BTreeMap::new()))
            .collect();

        for method in &methods {
            let raw: Vec<f64> = candidates.iter().map(|c| set.score(c, method)).collect();
            for (candidate, value) in candidates.iter().zip(normalize_scores(&raw)) {
                if let Some(entry) = scores.get_mut(*candidate) {
                    entry.insert(method.clone(), value);
                }
            }
        }

        Self {
            source: set.source().clone(),
            methods,
            scores,
        }
    }

    pub fn source(&self) -> &ColumnRef {
        &self.source
    }

    pub fn methods(&self) -> &BTreeSet<MethodName> {
        &self.methods
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnRef, &BTreeMap<MethodName, f64>)> {
        self.scores.iter()
    }

    pub fn score(&self, candidate: &ColumnRef, method: &MethodName) -> f64 {
        self.scores
            .get(candidate)
            .and_then(|s| s.get(method))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divides_by_max() {
        assert_eq!(normalize_scores(&[2.0, 1.0, 0.0]), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn zero_or_empty_max_gives_zeros() {
        assert_eq!(normalize_scores(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn methods_are_normalized_independently() {
        let source = ColumnRef::new("emp.dept_fk").unwrap();
        let a = ColumnRef::new("dept.id").unwrap();
        let b = ColumnRef::new("dept.code").unwrap();
        let bm25 = MethodName::new("bm25").unwrap();
        let minilm = MethodName::new("minilm").unwrap();
        let candidates = BTreeMap::from([
            (
                a.clone(),
                BTreeMap::from([(bm25.clone(), 12.0), (minilm.clone(), 0.45)]),
            ),
            (b.clone(), BTreeMap::from([(minilm.clone(), 0.9)])),
        ]);
        let set = CandidateScoreSet::new(source, candidates);
        let normalized = NormalizedScoreSet::from_candidates(&set);

        assert_eq!(normalized.score(&a, &bm25), 1.0);
        assert_eq!(normalized.score(&b, &bm25), 0.0);
        assert_eq!(normalized.score(&a, &minilm), 0.5);
        assert_eq!(normalized.score(&b, &minilm), 1.0);
        assert_eq!(normalized.methods().len(), 2);
    }
}

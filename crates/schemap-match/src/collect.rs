//! Merges per-method candidate lists into one score set per source column.

use std::collections::BTreeMap;

use schemap_model::{CandidateScoreSet, ColumnRef, MethodName, MethodResults};
use tracing::debug;

type CandidateScores = BTreeMap<ColumnRef, BTreeMap<MethodName, f64>>;

/// Accumulates method results for a run.
///
/// Items without a usable source or target id are skipped and counted; a
/// valid source without any valid target is kept with an empty candidate set.
#[derive(Debug, Default)]
pub struct CandidateCollector {
    sources: BTreeMap<ColumnRef, CandidateScores>,
    skipped: usize,
}

impl CandidateCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers source columns up front so each one yields a result even if
    /// no method mentions it.
    pub fn with_sources<'a>(mut self, sources: impl IntoIterator<Item = &'a ColumnRef>) -> Self {
        for source in sources {
            self.sources.entry(source.clone()).or_default();
        }
        self
    }

    /// Number of items or candidates dropped for malformed ids so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn add(&mut self, results: &MethodResults) {
        let method = &results.method;
        for item in &results.matches {
            let Some(source) = self.parse_id(item.source.as_deref(), method) else {
                continue;
            };
            let candidates = self.sources.entry(source).or_default();
            let mut targets = Vec::with_capacity(item.candidates.len() + 1);
            if let Some(best) = item.best_match.as_deref() {
                targets.push((best, item.score));
            }
            for cand in &item.candidates {
                match cand.target.as_deref() {
                    Some(target) => targets.push((target, cand.score)),
                    None => self.skipped += 1,
                }
            }
            for (raw_target, raw_score) in targets {
                let Ok(target) = ColumnRef::new(raw_target) else {
                    debug!(method = %method, target = raw_target, "skipping malformed target id");
                    self.skipped += 1;
                    continue;
                };
                let score = coerce_score(raw_score);
                let slot = candidates
                    .entry(target)
                    .or_default()
                    .entry(method.clone())
                    .or_insert(score);
                *slot = slot.max(score);
            }
        }
    }

    pub fn finish(self) -> Vec<CandidateScoreSet> {
        self.sources
            .into_iter()
            .map(|(source, candidates)| CandidateScoreSet::new(source, candidates))
            .collect()
    }

    fn parse_id(&mut self, raw: Option<&str>, method: &MethodName) -> Option<ColumnRef> {
        let Some(raw) = raw else {
            self.skipped += 1;
            return None;
        };
        match ColumnRef::new(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(method = %method, source = raw, "skipping malformed source id");
                self.skipped += 1;
                None
            }
        }
    }
}

/// Merges all method results into score sets ordered by source id.
pub fn collect_candidates(results: &[MethodResults]) -> Vec<CandidateScoreSet> {
    let mut collector = CandidateCollector::new();
    for result in results {
        collector.add(result);
    }
    collector.finish()
}

/// Missing or non-finite scores count as 0; negatives clamp to 0.
fn coerce_score(raw: Option<f64>) -> f64 {
    match raw {
        Some(value) if value.is_finite() => value.max(0.0),
        _ => 0.0,
    }
}

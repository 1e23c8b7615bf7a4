//! Weighted ensemble ranking with optional arbitration.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use schemap_model::{
    CandidateScoreSet, ColumnMatchResult, ColumnRef, MatchSource, MethodWeights, RankedCandidate,
    round_score,
};
use tracing::{debug, warn};

use crate::arbiter::{
    Arbiter, ArbitrationError, ArbitrationRequest, ArbitrationVerdict, OfferedCandidate,
};
use crate::normalize::NormalizedScoreSet;

struct Arbitration<'a> {
    arbiter: &'a dyn Arbiter,
    top_n: usize,
    timeout: Duration,
}

/// Ranks the candidates of one source column and picks the best match.
///
/// The ranker holds only shared references and is safe to use from many
/// threads at once.
pub struct EnsembleRanker<'a> {
    weights: MethodWeights,
    arbitration: Option<Arbitration<'a>>,
}

impl<'a> EnsembleRanker<'a> {
    pub fn new(weights: MethodWeights) -> Self {
        Self {
            weights,
            arbitration: None,
        }
    }

    /// Enables arbitration over the `top_n` best candidates.
    ///
    /// `top_n` of 0 is treated as 1.
    pub fn with_arbiter(mut self, arbiter: &'a dyn Arbiter, top_n: usize, timeout: Duration) -> Self {
        self.arbitration = Some(Arbitration {
            arbiter,
            top_n: top_n.max(1),
            timeout,
        });
        self
    }

    /// Scores every candidate and sorts them best first.
    pub fn rank_candidates(&self, set: &CandidateScoreSet) -> Vec<RankedCandidate> {
        let normalized = NormalizedScoreSet::from_candidates(set);
        let mut ranked: Vec<RankedCandidate> = normalized
            .iter()
            .map(|(candidate, scores)| {
                let total: f64 = scores
                    .iter()
                    .map(|(method, score)| self.weights.weight(method) * score)
                    .sum();
                RankedCandidate {
                    candidate: candidate.clone(),
                    method_scores: scores
                        .iter()
                        .map(|(method, score)| (method.clone(), round_score(*score)))
                        .collect::<BTreeMap<_, _>>(),
                    final_score: round_score(total),
                }
            })
            .collect();
        ranked.sort_by(compare_ranked);
        ranked
    }

    /// Produces the column result for one source, consulting the arbiter if
    /// one is configured. Never fails: arbitration problems are recorded in
    /// the result's `match_source`.
    pub fn match_column(&self, set: &CandidateScoreSet, context: &str) -> ColumnMatchResult {
        let ranked = self.rank_candidates(set);
        let Some(top) = ranked.first() else {
            debug!(source = %set.source(), "no candidates");
            return ColumnMatchResult::unmatched(set.source().clone());
        };

        let tentative = top.candidate.clone();
        let tentative_confidence = clamp_confidence(top.final_score);

        let (best_match, confidence, match_source) = match &self.arbitration {
            None => (tentative, tentative_confidence, MatchSource::Ensemble),
            Some(arbitration) => {
                arbitrate(arbitration, set.source(), context, &ranked, tentative_confidence)
                    .unwrap_or_else(|source| (tentative, tentative_confidence, source))
            }
        };

        debug!(
            source = %set.source(),
            best_match = %best_match,
            confidence,
            match_source = %match_source,
            candidates = ranked.len(),
            "ranked column"
        );

        ColumnMatchResult {
            source: set.source().clone(),
            best_match: Some(best_match),
            confidence,
            match_source,
            candidates: ranked,
        }
    }
}

/// Returns the arbitrated pick, or the fallback tag to use with the
/// tentative result.
fn arbitrate(
    arbitration: &Arbitration<'_>,
    source: &ColumnRef,
    context: &str,
    ranked: &[RankedCandidate],
    tentative_confidence: f64,
) -> Result<(ColumnRef, f64, MatchSource), MatchSource> {
    let request = ArbitrationRequest {
        source: source.clone(),
        context: context.to_string(),
        candidates: ranked
            .iter()
            .take(arbitration.top_n)
            .map(OfferedCandidate::from)
            .collect(),
        timeout: arbitration.timeout,
    };

    let verdict = call_arbiter(arbitration, &request).map_err(|error| {
        warn!(source = %source, %error, "arbitration failed, keeping ensemble pick");
        MatchSource::FallbackLlmError
    })?;

    let chosen = verdict
        .best_match
        .as_deref()
        .and_then(|raw| ColumnRef::new(raw).ok())
        .filter(|id| request.offers(id))
        .ok_or_else(|| {
            warn!(
                source = %source,
                named = verdict.best_match.as_deref().unwrap_or("<none>"),
                "arbiter named a candidate that was not offered"
            );
            MatchSource::FallbackInvalidLlm
        })?;

    let confidence = verdict
        .confidence
        .map_or(tentative_confidence, clamp_confidence);
    Ok((chosen, confidence, MatchSource::EnsembleLlm))
}

/// Calls the arbiter, turning a panic or an answer that arrived after the
/// deadline into an error.
fn call_arbiter(
    arbitration: &Arbitration<'_>,
    request: &ArbitrationRequest,
) -> Result<ArbitrationVerdict, ArbitrationError> {
    let started = Instant::now();
    let verdict = panic::catch_unwind(AssertUnwindSafe(|| arbitration.arbiter.arbitrate(request)))
        .map_err(|payload| ArbitrationError::Panicked(panic_message(payload.as_ref())))??;
    if started.elapsed() > arbitration.timeout {
        return Err(ArbitrationError::Timeout(arbitration.timeout));
    }
    Ok(verdict)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        round_score(value.clamp(0.0, 1.0))
    } else {
        0.0
    }
}

fn compare_ranked(left: &RankedCandidate, right: &RankedCandidate) -> Ordering {
    right
        .final_score
        .total_cmp(&left.final_score)
        .then_with(|| left.candidate.cmp(&right.candidate))
}

//! One full matching run: collect, rank, aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use schemap_model::{
    ColumnDescriptions, ColumnDocument, ColumnRef, ConfigError, EnsembleConfig, MatchReport,
    MethodResults,
};
use tracing::{debug, info, info_span, warn};

use crate::aggregate::TableAggregator;
use crate::arbiter::Arbiter;
use crate::collect::CandidateCollector;
use crate::lexical::bm25_method;
use crate::rank::EnsembleRanker;

/// Shared flag that stops a run between columns.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run reads.
#[derive(Debug, Clone, Default)]
pub struct MatchInputs {
    pub method_results: Vec<MethodResults>,
    /// Source schema columns. Each one yields a result even when no method
    /// mentions it, and supplies the text handed to the arbiter.
    pub source_columns: Vec<ColumnDocument>,
    pub descriptions: ColumnDescriptions,
}

impl MatchInputs {
    pub fn new(method_results: Vec<MethodResults>) -> Self {
        Self {
            method_results,
            ..Self::default()
        }
    }

    pub fn with_source_columns(mut self, columns: Vec<ColumnDocument>) -> Self {
        self.source_columns = columns;
        self
    }

    pub fn with_descriptions(mut self, descriptions: ColumnDescriptions) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Runs BM25 from the source columns against `target` and adds the
    /// results as the `bm25` method, replacing any loaded `bm25` results.
    pub fn with_lexical_results(mut self, target: &[ColumnDocument]) -> Self {
        let lexical = bm25_method(&self.source_columns, target, &self.descriptions);
        self.method_results.retain(|r| r.method != lexical.method);
        self.method_results.push(lexical);
        self
    }

    fn contexts(&self) -> BTreeMap<&ColumnRef, String> {
        self.source_columns
            .iter()
            .map(|doc| {
                let description = self.descriptions.get(doc.id.as_str()).map(String::as_str);
                (&doc.id, doc.context_text(description))
            })
            .collect()
    }
}

/// Runs the ensemble over a validated configuration.
pub struct MatchPipeline<'a> {
    config: EnsembleConfig,
    arbiter: Option<&'a dyn Arbiter>,
    cancellation: CancellationToken,
}

impl<'a> MatchPipeline<'a> {
    /// Validates `config`; a run never starts with a bad configuration.
    pub fn new(config: EnsembleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            arbiter: None,
            cancellation: CancellationToken::new(),
        })
    }

    /// Arbiter consulted when arbitration is enabled in the configuration.
    pub fn with_arbiter(mut self, arbiter: &'a dyn Arbiter) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn run(&self, inputs: &MatchInputs) -> MatchReport {
        let span = info_span!(
            "match_run",
            methods = inputs.method_results.len(),
            source_columns = inputs.source_columns.len()
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut collector =
            CandidateCollector::new().with_sources(inputs.source_columns.iter().map(|d| &d.id));
        for results in &inputs.method_results {
            collector.add(results);
        }
        if collector.skipped() > 0 {
            debug!(skipped = collector.skipped(), "dropped malformed method entries");
        }
        let sets = collector.finish();

        let ranker = self.ranker();
        let contexts = inputs.contexts();
        let column_matches: Vec<_> = sets
            .par_iter()
            .filter_map(|set| {
                if self.cancellation.is_cancelled() {
                    return None;
                }
                let context = contexts
                    .get(set.source())
                    .cloned()
                    .unwrap_or_else(|| set.source().to_string());
                Some(ranker.match_column(set, &context))
            })
            .collect();

        let cancelled = column_matches.len() < sets.len();
        if cancelled {
            warn!(
                ranked = column_matches.len(),
                total = sets.len(),
                "run cancelled before every column was ranked"
            );
        }

        let table_matches =
            TableAggregator::new(self.config.aggregation).aggregate(&column_matches);

        info!(
            columns = column_matches.len(),
            tables = table_matches.len(),
            duration_ms = start.elapsed().as_millis(),
            "match run complete"
        );

        MatchReport {
            weights: self.config.weights.clone(),
            column_match_count: column_matches.len(),
            table_match_count: table_matches.len(),
            column_matches,
            table_matches,
            cancelled,
        }
    }

    fn ranker(&self) -> EnsembleRanker<'a> {
        let ranker = EnsembleRanker::new(self.config.weights.clone());
        let arbitration = &self.config.arbitration;
        match (arbitration.enabled, self.arbiter) {
            (true, Some(arbiter)) => {
                ranker.with_arbiter(arbiter, arbitration.top_n, arbitration.timeout())
            }
            (true, None) => {
                warn!("arbitration enabled but no arbiter configured, using ensemble picks");
                ranker
            }
            (false, _) => ranker,
        }
    }
}

#[cfg(test)]
mod tests {
    use schemap_model::{MatchSource, MethodMatch, MethodName};

    use super::*;
    use crate::arbiter::{ArbitrationError, ArbitrationRequest, ArbitrationVerdict};

    fn doc(id: &str, data_type: &str) -> ColumnDocument {
        ColumnDocument {
            id: ColumnRef::new(id).unwrap(),
            data_type: data_type.to_string(),
        }
    }

    fn inputs() -> MatchInputs {
        let mpnet = MethodResults {
            method: MethodName::new("mpnet").unwrap(),
            matches: vec![
                MethodMatch::top_k("emp.id", [("staff.id", 0.9), ("staff.code", 0.4)]),
                MethodMatch::top_k("emp.name", [("staff.full_name", 0.8)]),
            ],
        };
        MatchInputs::new(vec![mpnet]).with_source_columns(vec![
            doc("emp.id", "int"),
            doc("emp.name", "text"),
            doc("emp.notes", "text"),
        ])
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = EnsembleConfig::default();
        config.weights.set(MethodName::new("mpnet").unwrap(), -1.0);
        assert!(MatchPipeline::new(config).is_err());
    }

    #[test]
    fn every_source_column_gets_a_result() {
        let report = MatchPipeline::new(EnsembleConfig::default())
            .unwrap()
            .run(&inputs());
        assert_eq!(report.column_match_count, 3);
        let sources: Vec<_> = report
            .column_matches
            .iter()
            .map(|m| m.source.to_string())
            .collect();
        assert_eq!(sources, ["emp.id", "emp.name", "emp.notes"]);
        assert_eq!(report.column_matches[2].match_source, MatchSource::Unmatched);
        assert_eq!(report.table_match_count, 1);
        assert_eq!(report.table_matches[0].best_match_table.as_deref(), Some("staff"));
        assert!(!report.cancelled);
    }

    #[test]
    fn cancelled_run_keeps_nothing_new_and_is_marked() {
        let token = CancellationToken::new();
        token.cancel();
        let report = MatchPipeline::new(EnsembleConfig::default())
            .unwrap()
            .with_cancellation(token)
            .run(&inputs());
        assert!(report.cancelled);
        assert!(report.column_matches.is_empty());
    }

    #[test]
    fn arbiter_only_runs_when_enabled() {
        let arbiter = |_: &ArbitrationRequest| -> Result<ArbitrationVerdict, ArbitrationError> {
            Err(ArbitrationError::Transport("offline".to_string()))
        };

        let report = MatchPipeline::new(EnsembleConfig::default())
            .unwrap()
            .with_arbiter(&arbiter)
            .run(&inputs());
        assert_eq!(report.column_matches[0].match_source, MatchSource::Ensemble);

        let mut config = EnsembleConfig::default();
        config.arbitration.enabled = true;
        let report = MatchPipeline::new(config)
            .unwrap()
            .with_arbiter(&arbiter)
            .run(&inputs());
        assert_eq!(report.column_matches[0].match_source, MatchSource::FallbackLlmError);
        assert_eq!(report.column_matches[2].match_source, MatchSource::Unmatched);
    }

    #[test]
    fn arbiter_receives_schema_context() {
        let arbiter = |request: &ArbitrationRequest| -> Result<ArbitrationVerdict, ArbitrationError> {
            assert!(request.context.starts_with(request.source.as_str()));
            assert!(request.context.contains("type"));
            Ok(ArbitrationVerdict {
                best_match: request.candidates.first().map(|c| c.candidate.to_string()),
                confidence: Some(0.7),
            })
        };
        let mut config = EnsembleConfig::default();
        config.arbitration.enabled = true;
        let report = MatchPipeline::new(config)
            .unwrap()
            .with_arbiter(&arbiter)
            .run(&inputs());
        assert_eq!(report.column_matches[0].match_source, MatchSource::EnsembleLlm);
        assert_eq!(report.column_matches[0].confidence, 0.7);
    }

    #[test]
    fn lexical_results_replace_loaded_bm25() {
        let stale = MethodResults {
            method: MethodName::bm25(),
            matches: vec![MethodMatch::top1("emp.id", "other.thing", 1.0)],
        };
        let target = [
            doc("staff.id", "int"),
            doc("staff.full_name", "text"),
            doc("staff.salary", "numeric"),
            doc("staff.hired", "date"),
        ];
        let inputs = MatchInputs::new(vec![stale])
            .with_source_columns(vec![doc("emp.id", "int")])
            .with_lexical_results(&target);
        assert_eq!(inputs.method_results.len(), 1);
        assert_eq!(
            inputs.method_results[0].matches[0].best_match.as_deref(),
            Some("staff.id")
        );
    }
}

//! BM25 lexical retrieval over flattened schema columns.
//!
//! Produces the `bm25` method results consumed by the ensemble: one top-1
//! target per source column, scores max-normalized per source.

use std::collections::BTreeMap;

use schemap_model::{ColumnDescriptions, ColumnDocument, MethodMatch, MethodName, MethodResults};
use tracing::debug;

use crate::normalize::normalize_scores;

/// Okapi BM25 tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Fraction of the mean IDF used as the floor for very common terms.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Lowercased alphanumeric runs of `text`, duplicates kept.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// An in-memory BM25 index over a fixed corpus.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    term_freqs: Vec<BTreeMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: BTreeMap<String, f64>,
}

impl Bm25Index {
    pub fn new(corpus: &[Vec<String>]) -> Self {
        Self::with_params(corpus, Bm25Params::default())
    }

    pub fn with_params(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut doc_counts: BTreeMap<String, usize> = BTreeMap::new();

        for doc in corpus {
            let mut freqs: BTreeMap<String, usize> = BTreeMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_counts.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(doc.len());
            term_freqs.push(freqs);
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / corpus.len() as f64
        };

        let n = corpus.len() as f64;
        let mut idf: BTreeMap<String, f64> = doc_counts
            .into_iter()
            .map(|(term, count)| {
                let count = count as f64;
                (term, (n - count + 0.5).ln() - (count + 0.5).ln())
            })
            .collect();
        if !idf.is_empty() {
            let mean = idf.values().sum::<f64>() / idf.len() as f64;
            let floor = params.epsilon * mean;
            for value in idf.values_mut() {
                if *value < 0.0 {
                    *value = floor;
                }
            }
        }

        Self {
            params,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Raw BM25 score of every document for `query`, in corpus order.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &len)| {
                let relative_len = if self.avg_doc_len > 0.0 {
                    len as f64 / self.avg_doc_len
                } else {
                    1.0
                };
                query
                    .iter()
                    .map(|term| {
                        let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * relative_len))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Matches every source column to its best lexical target.
///
/// Descriptions, keyed by `table.column`, are appended to both sides' text.
/// Returns an empty result set when either schema has no columns.
pub fn bm25_method(
    source: &[ColumnDocument],
    target: &[ColumnDocument],
    descriptions: &ColumnDescriptions,
) -> MethodResults {
    let mut results = MethodResults::new(MethodName::bm25());
    if source.is_empty() || target.is_empty() {
        return results;
    }

    let text = |doc: &ColumnDocument| {
        tokenize(&doc.lexical_text(descriptions.get(doc.id.as_str()).map(String::as_str)))
    };
    let corpus: Vec<Vec<String>> = target.iter().map(text).collect();
    let index = Bm25Index::new(&corpus);

    for doc in source {
        let scores = normalize_scores(&index.scores(&text(doc)));
        let mut best: Option<(&ColumnDocument, f64)> = None;
        for (candidate, &score) in target.iter().zip(&scores) {
            let better = match best {
                None => true,
                Some((current, top)) => score > top || (score == top && candidate.id < current.id),
            };
            if better {
                best = Some((candidate, score));
            }
        }
        if let Some((winner, score)) = best {
            results
                .matches
                .push(MethodMatch::top1(doc.id.as_str(), winner.id.as_str(), score));
        }
    }

    debug!(
        sources = source.len(),
        targets = target.len(),
        "bm25 matching finished"
    );
    results
}

#[cfg(test)]
mod tests {
    use schemap_model::ColumnRef;

    use super::*;

    fn doc(id: &str, data_type: &str) -> ColumnDocument {
        ColumnDocument {
            id: ColumnRef::new(id).unwrap(),
            data_type: data_type.to_string(),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        tokenize(text)
    }

    #[test]
    fn tokenize_splits_on_punctuation_and_lowercases() {
        assert_eq!(tokenize("Emp.Dept_FK  integer"), ["emp", "dept", "fk", "integer"]);
        assert!(tokenize(" _. ").is_empty());
    }

    #[test]
    fn exact_overlap_scores_highest() {
        let corpus = vec![
            tokens("dept id integer"),
            tokens("dept name text"),
            tokens("staff salary numeric"),
        ];
        let index = Bm25Index::new(&corpus);
        let scores = index.scores(&tokens("dept name"));
        assert!(scores[1] > scores[0]);
        assert!(scores[0] > scores[2]);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn common_terms_get_a_positive_floor() {
        let corpus = vec![tokens("a x p"), tokens("a y q"), tokens("a z r")];
        let index = Bm25Index::new(&corpus);
        let scores = index.scores(&tokens("a"));
        assert!(scores.iter().all(|s| *s > 0.0));
        assert_eq!(scores[0], scores[1]);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let index = Bm25Index::new(&[]);
        assert!(index.is_empty());
        assert!(index.scores(&tokens("anything")).is_empty());
    }

    #[test]
    fn bm25_method_picks_top_target_per_source() {
        let source = [doc("emp.dept_name", "text"), doc("emp.salary", "numeric")];
        let target = [
            doc("dept.dept_id", "integer"),
            doc("dept.dept_name", "text"),
            doc("payroll.salary", "numeric"),
        ];
        let results = bm25_method(&source, &target, &ColumnDescriptions::new());
        assert_eq!(results.method.as_str(), "bm25");
        assert_eq!(results.matches.len(), 2);
        assert_eq!(results.matches[0].best_match.as_deref(), Some("dept.dept_name"));
        assert_eq!(results.matches[0].score, Some(1.0));
        assert_eq!(results.matches[1].best_match.as_deref(), Some("payroll.salary"));
    }

    #[test]
    fn descriptions_feed_the_text() {
        let source = [doc("emp.x1", "")];
        let target = [doc("t.a", ""), doc("t.b", ""), doc("t.c", ""), doc("t.d", "")];
        let descriptions = ColumnDescriptions::from([
            ("emp.x1".to_string(), "hire date".to_string()),
            ("t.b".to_string(), "date of hire".to_string()),
        ]);
        let results = bm25_method(&source, &target, &descriptions);
        assert_eq!(results.matches[0].best_match.as_deref(), Some("t.b"));
    }

    #[test]
    fn all_zero_scores_fall_back_to_smallest_id() {
        let source = [doc("emp.zzz", "")];
        let target = [doc("t.b", ""), doc("t.a", "")];
        let results = bm25_method(&source, &target, &ColumnDescriptions::new());
        assert_eq!(results.matches[0].best_match.as_deref(), Some("t.a"));
        assert_eq!(results.matches[0].score, Some(0.0));
    }

    #[test]
    fn empty_side_yields_no_matches() {
        let target = [doc("t.a", "")];
        assert!(bm25_method(&[], &target, &ColumnDescriptions::new()).matches.is_empty());
        assert!(bm25_method(&target, &[], &ColumnDescriptions::new()).matches.is_empty());
    }
}

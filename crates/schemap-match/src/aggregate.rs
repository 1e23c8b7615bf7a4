//! Rolls column matches up into table matches.

use std::collections::BTreeMap;

use schemap_model::{
    AggregationMode, ColumnMatchRecord, ColumnMatchResult, ColumnRef, TableMatchResult,
    round_score, table_of,
};
use tracing::warn;

/// A column match as seen by the aggregator.
///
/// Implemented for typed results and for loose records read back from an
/// export, so both go through the same validation.
pub trait ColumnVote {
    fn source_id(&self) -> &str;
    fn best_match_id(&self) -> Option<&str>;
    fn confidence(&self) -> f64;
}

impl ColumnVote for ColumnMatchResult {
    fn source_id(&self) -> &str {
        self.source.as_str()
    }

    fn best_match_id(&self) -> Option<&str> {
        self.best_match.as_ref().map(ColumnRef::as_str)
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl ColumnVote for ColumnMatchRecord {
    fn source_id(&self) -> &str {
        &self.source
    }

    fn best_match_id(&self) -> Option<&str> {
        self.best_match.as_deref()
    }

    fn confidence(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }
}

#[derive(Default)]
struct TableGroup {
    votes: BTreeMap<String, usize>,
    confidence_sum: f64,
    members: usize,
}

impl TableGroup {
    fn winner(&self) -> Option<String> {
        // BTreeMap iterates in name order, so the first maximum wins ties.
        let mut best: Option<(&String, usize)> = None;
        for (table, &count) in &self.votes {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((table, count));
            }
        }
        best.map(|(table, _)| table.clone())
    }
}

/// Aggregates column matches into per-table matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableAggregator {
    mode: AggregationMode,
}

impl TableAggregator {
    pub fn new(mode: AggregationMode) -> Self {
        Self { mode }
    }

    /// Groups matches by source table and votes on each group's target table.
    ///
    /// Sources with a malformed id are skipped. A null or malformed best match
    /// casts no vote but its confidence still counts toward the table mean.
    pub fn aggregate<T: ColumnVote>(&self, matches: &[T]) -> Vec<TableMatchResult> {
        match self.mode {
            AggregationMode::MajorityVote => majority_vote(matches),
        }
    }
}

fn majority_vote<T: ColumnVote>(matches: &[T]) -> Vec<TableMatchResult> {
    let mut groups: BTreeMap<String, TableGroup> = BTreeMap::new();
    for item in matches {
        let Some(source_table) = table_of(item.source_id()) else {
            warn!(source = item.source_id(), "skipping column match with malformed source id");
            continue;
        };
        let group = groups.entry(source_table).or_default();
        group.members += 1;
        let confidence = item.confidence();
        if confidence.is_finite() {
            group.confidence_sum += confidence;
        }
        if let Some(target_table) = item.best_match_id().and_then(table_of) {
            *group.votes.entry(target_table).or_insert(0) += 1;
        }
    }

    let mut tables: Vec<TableMatchResult> = groups
        .into_iter()
        .map(|(source_table, group)| TableMatchResult {
            best_match_table: group.winner(),
            confidence: round_score(group.confidence_sum / group.members as f64),
            column_match_count: group.members,
            source_table,
        })
        .collect();

    tables.sort_by(|left, right| {
        right
            .confidence
            .total_cmp(&left.confidence)
            .then_with(|| left.source_table.cmp(&right.source_table))
    });
    tables
}

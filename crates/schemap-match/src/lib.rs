//! Hybrid ensemble schema matching.
//!
//! Per-method retrieval results are merged into candidate sets
//! ([`collect`]), max-normalized per method ([`normalize`]), combined by
//! weight and optionally arbitrated ([`rank`]), then rolled up to table
//! matches by majority vote ([`aggregate`]). [`MatchPipeline`] runs the
//! whole sequence.

#![deny(unsafe_code)]

pub mod aggregate;
pub mod arbiter;
pub mod chat;
pub mod collect;
pub mod export;
pub mod lexical;
pub mod normalize;
pub mod pipeline;
pub mod rank;

pub use aggregate::{ColumnVote, TableAggregator};
pub use arbiter::{
    Arbiter, ArbitrationError, ArbitrationRequest, ArbitrationVerdict, OfferedCandidate,
    parse_verdict,
};
pub use chat::ChatArbiter;
pub use collect::{CandidateCollector, collect_candidates};
pub use export::{
    ExportError, ExportFormat, StoredReport, parse_column_records, read_column_records, write_csv,
    write_report,
};
pub use lexical::{Bm25Index, Bm25Params, bm25_method, tokenize};
pub use normalize::{NormalizedScoreSet, normalize_scores};
pub use pipeline::{CancellationToken, MatchInputs, MatchPipeline};
pub use rank::EnsembleRanker;

pub mod candidates;
pub mod error;
pub mod ids;
pub mod matching;
pub mod options;
pub mod schema;

pub use candidates::{CandidateScoreSet, MethodMatch, MethodResults, ScoredTarget};
pub use error::{ConfigError, ModelError, Result};
pub use ids::{COLUMN_SEPARATOR, ColumnRef, MethodName, table_of};
pub use matching::{
    ColumnMatchRecord, ColumnMatchResult, MatchReport, MatchSource, RankedCandidate,
    TableMatchResult, round_score,
};
pub use options::{
    AggregationMode, ArbitrationConfig, DEFAULT_TOP_N, EnsembleConfig, MethodWeights,
    parse_weight_override,
};
pub use schema::{ColumnDescriptions, ColumnDocument, ColumnSchema, SchemaDocument, TableSchema};

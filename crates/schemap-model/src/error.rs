use std::path::PathBuf;

use thiserror::Error;

/// Identifier validation failures, raised where raw ids enter the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid column reference {0:?}: expected `table.column`")]
    InvalidColumnRef(String),
    #[error("invalid method name {0:?}")]
    InvalidMethodName(String),
}

/// Run-level configuration problems. Any of these aborts a run before
/// per-column work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weight for method `{method}` must be finite and non-negative, got {weight}")]
    InvalidWeight { method: String, weight: f64 },

    #[error("unsupported aggregation mode `{0}` (supported: majority_vote)")]
    UnsupportedAggregation(String),

    #[error("arbitration top_n must be at least 1")]
    ZeroTopN,

    #[error("arbitration timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid weight override {0:?}: expected `method=value`")]
    InvalidWeightOverride(String),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;

//! Configuration for an ensemble matching run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ids::MethodName;

/// Default method keys and weights.
pub const DEFAULT_WEIGHTS: [(&str, f64); 3] = [("bm25", 0.25), ("minilm", 0.35), ("mpnet", 0.40)];

/// Weight per retrieval method. Methods without an entry weigh 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodWeights(BTreeMap<MethodName, f64>);

impl MethodWeights {
    pub fn new(weights: BTreeMap<MethodName, f64>) -> Self {
        Self(weights)
    }

    pub fn weight(&self, method: &MethodName) -> f64 {
        self.0.get(method).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, method: MethodName, weight: f64) {
        self.0.insert(method, weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodName, f64)> {
        self.0.iter().map(|(method, weight)| (method, *weight))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (method, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    method: method.to_string(),
                    weight: *weight,
                });
            }
        }
        Ok(())
    }
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self(
            DEFAULT_WEIGHTS
                .iter()
                .filter_map(|(name, weight)| MethodName::new(*name).ok().map(|m| (m, *weight)))
                .collect(),
        )
    }
}

impl FromIterator<(MethodName, f64)> for MethodWeights {
    fn from_iter<T: IntoIterator<Item = (MethodName, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses a `method=weight` override as given on the command line.
pub fn parse_weight_override(raw: &str) -> Result<(MethodName, f64), ConfigError> {
    let invalid = || ConfigError::InvalidWeightOverride(raw.to_string());
    let (method, value) = raw.split_once('=').ok_or_else(invalid)?;
    let method = MethodName::new(method).map_err(|_| invalid())?;
    let weight = value.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok((method, weight))
}

/// How column matches are rolled up into table matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationMode {
    /// One vote per column for its best match's table.
    #[default]
    MajorityVote,
}

impl AggregationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MajorityVote => "majority_vote",
        }
    }
}

impl FromStr for AggregationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "majority_vote" | "majority" => Ok(Self::MajorityVote),
            _ => Err(ConfigError::UnsupportedAggregation(s.to_string())),
        }
    }
}

impl TryFrom<String> for AggregationMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationMode> for String {
    fn from(value: AggregationMode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default OpenAI-compatible endpoint (Groq).
pub const DEFAULT_ARBITER_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default arbitration model.
pub const DEFAULT_ARBITER_MODEL: &str = "llama-3.1-8b-instant";
/// Default number of candidates offered to an arbiter.
pub const DEFAULT_TOP_N: usize = 5;

/// Settings for the optional arbitration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    pub enabled: bool,
    /// Number of top-ranked candidates offered to the service.
    pub top_n: usize,
    /// Upper bound for a single arbitration call.
    pub timeout_secs: u64,
    pub base_url: String,
    pub model: String,
    /// API key; falls back to the environment when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: DEFAULT_TOP_N,
            timeout_secs: 30,
            base_url: DEFAULT_ARBITER_BASE_URL.to_string(),
            model: DEFAULT_ARBITER_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl ArbitrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Full configuration for a matching run, usually loaded from TOML.
///
/// ```toml
/// aggregation = "majority_vote"
///
/// [weights]
/// bm25 = 0.25
/// minilm = 0.35
/// mpnet = 0.40
///
/// [arbitration]
/// enabled = true
/// top_n = 5
/// timeout_secs = 20
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub weights: MethodWeights,
    pub arbitration: ArbitrationConfig,
    pub aggregation: AggregationMode,
}

impl EnsembleConfig {
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Checks the whole configuration. Must pass before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if self.arbitration.enabled {
            self.arbitration.validate()?;
        }
        Ok(())
    }
}

//! Arbitration among the top ensemble candidates.
//!
//! An [`Arbiter`] is an external decision service (usually an LLM) that is
//! shown the source column and a bounded list of ranked candidates and
//! names one of them. The ranker treats every failure as data: see
//! [`crate::rank`] for the fallback policy.

use std::collections::BTreeMap;
use std::time::Duration;

use schemap_model::{ColumnRef, MethodName, RankedCandidate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why an arbitration call produced no usable verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ArbitrationError {
    #[error("arbitration timed out after {0:?}")]
    Timeout(Duration),

    #[error("arbitration transport error: {0}")]
    Transport(String),

    #[error("arbitration service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("arbitration response was not usable: {0}")]
    Unparsable(String),

    #[error("arbiter panicked: {0}")]
    Panicked(String),

    /// No API key in the configuration or the environment.
    #[error("no arbitration API key configured (set {0})")]
    MissingApiKey(&'static str),
}

/// A candidate as offered to the arbitration service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferedCandidate {
    pub candidate: ColumnRef,
    pub final_score: f64,
    pub method_scores: BTreeMap<MethodName, f64>,
}

impl From<&RankedCandidate> for OfferedCandidate {
    fn from(ranked: &RankedCandidate) -> Self {
        Self {
            candidate: ranked.candidate.clone(),
            final_score: ranked.final_score,
            method_scores: ranked.method_scores.clone(),
        }
    }
}

/// Everything the service gets to see for one source column.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrationRequest {
    pub source: ColumnRef,
    /// Free-text description of the source column.
    pub context: String,
    /// Top-ranked candidates, best first.
    pub candidates: Vec<OfferedCandidate>,
    /// Upper bound the implementation must honor for this call.
    pub timeout: Duration,
}

impl ArbitrationRequest {
    /// True if `id` names one of the offered candidates.
    pub fn offers(&self, id: &ColumnRef) -> bool {
        self.candidates.iter().any(|c| &c.candidate == id)
    }
}

/// The service's answer, before it is checked against the offered set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArbitrationVerdict {
    pub best_match: Option<String>,
    pub confidence: Option<f64>,
}

/// External decision service choosing among offered candidates.
///
/// Implementations are shared across ranking threads and should bound each
/// call by `request.timeout`. The ranker discards a verdict that arrives
/// late and treats a panic as a failed call.
pub trait Arbiter: Send + Sync {
    fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbitrationVerdict, ArbitrationError>;
}

impl<F> Arbiter for F
where
    F: Fn(&ArbitrationRequest) -> Result<ArbitrationVerdict, ArbitrationError> + Send + Sync,
{
    fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbitrationVerdict, ArbitrationError> {
        self(request)
    }
}

/// Parses free-form service output into a verdict.
///
/// The whole text is tried as JSON first, then the outermost `{...}` span.
/// `confidence` may be a number or a numeric string; anything else makes the
/// response unusable. A missing or non-string `best_match` is kept as
/// `None`, which the ranker treats as naming nothing it offered.
pub fn parse_verdict(text: &str) -> Result<ArbitrationVerdict, ArbitrationError> {
    let text = text.trim();
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => extract_object(text)?,
    };
    let Value::Object(fields) = value else {
        return Err(ArbitrationError::Unparsable(
            "expected a JSON object".to_string(),
        ));
    };
    let best_match = fields
        .get("best_match")
        .and_then(Value::as_str)
        .map(str::to_string);
    let confidence = match fields.get("confidence") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => Some(s.trim().parse::<f64>().map_err(|_| {
            ArbitrationError::Unparsable(format!("confidence {s:?} is not a number"))
        })?),
        Some(other) => {
            return Err(ArbitrationError::Unparsable(format!(
                "confidence {other} is not a number"
            )));
        }
    };
    Ok(ArbitrationVerdict {
        best_match,
        confidence,
    })
}

fn extract_object(text: &str) -> Result<Value, ArbitrationError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ArbitrationError::Unparsable(
            "no JSON object in response".to_string(),
        ));
    };
    if end < start {
        return Err(ArbitrationError::Unparsable(
            "no JSON object in response".to_string(),
        ));
    }
    serde_json::from_str(&text[start..=end])
        .map_err(|e| ArbitrationError::Unparsable(e.to_string()))
}

//! OpenAI-compatible chat-completion arbiter.
//!
//! Works with any `chat/completions` endpoint; the defaults point at Groq.

use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use schemap_model::ArbitrationConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arbiter::{
    Arbiter, ArbitrationError, ArbitrationRequest, ArbitrationVerdict, parse_verdict,
};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["SCHEMAP_ARBITER_API_KEY", "GROQ_API_KEY"];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Picks the configured key, else the first non-empty environment variable.
pub fn resolve_api_key(
    configured: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .map(|key| key.trim().to_string())
                .find(|key| !key.is_empty())
        })
}

/// Arbiter backed by a chat-completion model.
#[derive(Clone)]
pub struct ChatArbiter {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatArbiter {
    /// Builds an arbiter from configuration, reading the API key from the
    /// environment when the configuration has none.
    pub fn from_config(config: &ArbitrationConfig) -> Result<Self, ArbitrationError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), |name| std::env::var(name).ok())
            .ok_or(ArbitrationError::MissingApiKey("SCHEMAP_ARBITER_API_KEY or GROQ_API_KEY"))?;
        let client = Client::builder()
            .build()
            .map_err(|e| ArbitrationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Arbiter for ChatArbiter {
    fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbitrationVerdict, ArbitrationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(request),
            }],
        };

        debug!(
            source = %request.source,
            candidates = request.candidates.len(),
            "requesting arbitration"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, concat!("schemap/", env!("CARGO_PKG_VERSION")))
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| transport_error(&e, request))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ArbitrationError::Status { status, message });
        }

        let reply: ChatResponse = response
            .json()
            .map_err(|e| transport_error(&e, request))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ArbitrationError::Unparsable("response had no message content".to_string())
            })?;
        parse_verdict(&content)
    }
}

fn transport_error(error: &reqwest::Error, request: &ArbitrationRequest) -> ArbitrationError {
    if error.is_timeout() {
        ArbitrationError::Timeout(request.timeout)
    } else if error.is_decode() {
        ArbitrationError::Unparsable(error.to_string())
    } else {
        ArbitrationError::Transport(error.to_string())
    }
}

/// Prompt listing the source context and the offered candidates.
pub fn build_prompt(request: &ArbitrationRequest) -> String {
    let candidates =
        serde_json::to_string_pretty(&request.candidates).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are a schema matching expert.\n\n\
         SOURCE:\n{context}\n\n\
         CANDIDATES:\n{candidates}\n\n\
         Rules:\n\
         - Choose best_match only from the candidates list\n\
         - Return ONLY valid JSON\n\n\
         Return exactly:\n\
         {{\"best_match\": \"table.column\", \"confidence\": 0.0}}\n",
        context = if request.context.is_empty() {
            request.source.as_str()
        } else {
            request.context.as_str()
        },
    )
}

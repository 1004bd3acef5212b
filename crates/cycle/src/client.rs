//! Generation service boundary: client trait, error taxonomy, reference
//! Anthropic client.
//!
//! The cycle driver owns prompt construction, retries and reply
//! recovery; implementations of [`GenerationClient`] own only the
//! specifics of one service API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for generation client operations.
#[derive(Debug, Clone)]
pub enum GenerationError {
    /// Network or transport error.
    Network(String),
    /// The service returned an error response.
    Api { status: u16, message: String },
    /// The service reply could not be read.
    Parse(String),
}

impl GenerationError {
    /// Whether a retry might succeed. Transport hiccups, rate limits and
    /// server-side errors are retryable; authentication failures and
    /// other client errors are not, and neither is a reply that arrived
    /// but could not be read.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network(_) => true,
            GenerationError::Api { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Parse(_) => false,
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Network(msg) => write!(f, "generation network error: {}", msg),
            GenerationError::Api { status, message } => {
                write!(f, "generation API error ({}): {}", status, message)
            }
            GenerationError::Parse(msg) => write!(f, "generation parse error: {}", msg),
        }
    }
}

impl std::error::Error for GenerationError {}

/// A message in a generation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Trait for sending an assembled prompt to the generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send a prompt and return the raw text reply.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Minimal logging that doesn't require a full tracing setup.
pub(crate) fn retry_log(msg: &str) {
    // In production this would use tracing::warn!
    // Here we use eprintln so it doesn't affect test output
    eprintln!("[cycle] {}", msg);
}

// ── AnthropicClient (feature-gated) ──────────────────────────────────

/// Default model for the reference client.
#[cfg(feature = "anthropic")]
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Standing instruction so replies land in the recovery parser's strict
/// layer instead of its fallbacks.
#[cfg(feature = "anthropic")]
const SYSTEM_PROMPT: &str = "Respond with valid JSON only. Do not add any extra \
text, explanation, prefix or suffix. The JSON must parse directly.";

#[cfg(feature = "anthropic")]
/// Reference generation client using the Anthropic Messages API.
///
/// Uses `ureq` for HTTP. Reads the API key from the `ANTHROPIC_API_KEY`
/// environment variable.
pub struct AnthropicClient {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL (default: https://api.anthropic.com).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
}

#[cfg(feature = "anthropic")]
impl AnthropicClient {
    /// Create a client from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, GenerationError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            GenerationError::Network("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Create a client with an explicit API key and the default model.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl GenerationClient for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let model = self.model.clone();

        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        let body = serde_json::json!({
            "model": model,
            "max_tokens": 1024,
            "system": SYSTEM_PROMPT,
            "messages": messages,
        });

        // Use spawn_blocking to run ureq (sync HTTP) from async context
        let result: Result<String, GenerationError> = tokio::task::spawn_blocking(move || {
            let url = format!("{}/v1/messages", base_url);
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .send_json(body);

            match response {
                Ok(resp) => {
                    let json: serde_json::Value = resp.into_body().read_json().map_err(|e| {
                        GenerationError::Parse(format!("failed to read service response: {}", e))
                    })?;
                    // Extract content[0].text
                    let text = json["content"]
                        .as_array()
                        .and_then(|arr| arr.first())
                        .and_then(|c| c["text"].as_str())
                        .map(|s| s.to_string());
                    text.ok_or_else(|| {
                        GenerationError::Parse("no text content in service response".to_string())
                    })
                }
                Err(ureq::Error::StatusCode(code)) => Err(GenerationError::Api {
                    status: code,
                    message: format!("service returned status {}", code),
                }),
                Err(e) => Err(GenerationError::Network(e.to_string())),
            }
        })
        .await
        .map_err(|e| GenerationError::Network(format!("task join error: {}", e)))?;

        result
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

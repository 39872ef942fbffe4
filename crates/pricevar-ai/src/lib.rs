//! Narrative layer: the `Narrator` seam, prompt rendering, and an HTTP LLM client.

use std::time::Duration;

use async_trait::async_trait;
use pricevar_core::FactGroup;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub mod prompt;
pub use prompt::{DEFAULT_INSIGHT_PROMPT, DEFAULT_MAX_PROMPT, render_facts_prompt};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::OllamaNarrator;

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("narrative timed out after {0:?}")]
    Timeout(Duration),
    #[error("model returned an empty completion")]
    Empty,
}

/// Opaque text completion: prompt in, generated text out.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, NarrativeError>;
}

/// Connection settings for an Ollama-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// e.g. `http://localhost:11434` (trailing slash is trimmed).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.1".into(),
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

/// Run one completion under `timeout`. Returns the trimmed text; an empty
/// completion is an error.
pub async fn narrate(
    narrator: &dyn Narrator,
    prompt: &str,
    timeout: Duration,
) -> Result<String, NarrativeError> {
    info!(prompt_len = prompt.len(), "generating narrative");
    let text = match tokio::time::timeout(timeout, narrator.complete(prompt)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(?timeout, "narrative generation timed out");
            return Err(NarrativeError::Timeout(timeout));
        }
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(NarrativeError::Empty);
    }
    Ok(text.to_string())
}

/// Substitute the fact groups into `template`, then [`narrate`].
pub async fn generate_narrative(
    narrator: &dyn Narrator,
    template: &str,
    groups: &[FactGroup],
    timeout: Duration,
) -> Result<String, NarrativeError> {
    let prompt = render_facts_prompt(template, groups)?;
    narrate(narrator, &prompt, timeout).await
}

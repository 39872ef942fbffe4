//! HTTP completion client for an Ollama-compatible `/api/generate` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{LlmConfig, NarrativeError, Narrator};

/// Narrator backed by a local or remote Ollama server.
pub struct OllamaNarrator {
    client: reqwest::Client,
    base_url: String,
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaNarrator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl Narrator for OllamaNarrator {
    async fn complete(&self, prompt: &str) -> Result<String, NarrativeError> {
        let url = self.endpoint();
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        info!(url = %url, model = %self.config.model, "requesting completion");
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NarrativeError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&text)?;
        info!(chars = parsed.response.len(), "completion received");
        Ok(parsed.response)
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::error::{truncate_body, FinsightError};

/// Per-request completion knobs.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat-completion backend seam. The insight generator is written
/// against this trait so its parsing and fallback behavior is testable
/// without a network.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<String, FinsightError>;
}

/// OpenAI-style `/chat/completions` backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<String, FinsightError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FinsightError::Provider(format!("Completion request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FinsightError::Provider(format!(
                "Completion endpoint returned HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }

        let reply: ChatResponse = resp.json().await.map_err(|e| {
            FinsightError::Provider(format!("Failed to parse completion response: {e}"))
        })?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| FinsightError::Provider("Completion reply had no choices".into()))
    }
}

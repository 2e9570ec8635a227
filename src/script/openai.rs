//! OpenAI-compatible chat-completions client.
//!
//! Works with any provider that speaks the `/v1/chat/completions` wire format.

use super::{ScriptGenerator, ScriptRequest};
use crate::defaults;
use crate::error::{MindtrackError, Result};
use async_trait::async_trait;

pub struct OpenAiScriptGenerator {
    client: reqwest::Client,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiScriptGenerator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: defaults::LLM_TEMPERATURE,
            max_tokens: defaults::LLM_MAX_TOKENS,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn body(&self, request: &ScriptRequest<'_>) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": defaults::SYSTEM_PERSONA },
                { "role": "user",   "content": request.prompt() }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens
        })
    }
}

fn generation_error(message: impl Into<String>) -> MindtrackError {
    MindtrackError::Generation {
        message: message.into(),
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiScriptGenerator {
    async fn generate(&self, request: ScriptRequest<'_>) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut req = self.client.post(&url).json(&self.body(&request));
        // Local OpenAI-compatible servers need no key.
        if !request.api_key.is_empty() {
            req = req.bearer_auth(request.api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| generation_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(generation_error(format!(
                "API returned {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| generation_error(format!("failed to parse response: {e}")))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(generation_error("model returned an empty script"));
        }

        tracing::debug!(chars = text.len(), model = request.model, "script generated");
        Ok(text)
    }
}

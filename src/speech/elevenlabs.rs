//! ElevenLabs text-to-speech client.

use super::{SpeechRequest, SpeechSynthesizer};
use crate::defaults;
use crate::error::{MindtrackError, Result};
use async_trait::async_trait;

/// Calls `POST {base_url}/v1/text-to-speech/{voice_id}`.
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    base_url: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, voice_id)
    }

    fn body(request: &SpeechRequest<'_>) -> serde_json::Value {
        serde_json::json!({
            "text": request.text,
            "model_id": request.model_id,
            "voice_settings": {
                "stability": defaults::SPEECH_STABILITY,
                "similarity_boost": defaults::SPEECH_SIMILARITY_BOOST,
                "speed": request.speed,
            }
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<Vec<u8>> {
        if request.api_key.is_empty() {
            return Err(MindtrackError::Synthesis {
                message: "ElevenLabs API key is not configured".to_string(),
            });
        }

        tracing::debug!(
            voice = request.voice_id,
            model = request.model_id,
            chars = request.text.len(),
            "requesting speech"
        );

        let response = self
            .client
            .post(self.endpoint(request.voice_id))
            .header("xi-api-key", request.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(|e| MindtrackError::Synthesis {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MindtrackError::Synthesis {
                message: format!("ElevenLabs API error: {}", status.as_u16()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MindtrackError::Synthesis {
                message: format!("failed to read audio: {e}"),
            })?;

        Ok(bytes.to_vec())
    }
}

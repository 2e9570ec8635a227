//! Speech synthesis: turns one chapter of text into encoded audio.

pub mod elevenlabs;

use crate::error::{MindtrackError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

pub use elevenlabs::ElevenLabsSynthesizer;

/// Parameters for a single synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice_id: &'a str,
    pub model_id: &'a str,
    pub speed: f32,
    pub api_key: &'a str,
}

/// Trait for text-to-speech backends.
///
/// This trait allows swapping implementations (real API vs mock).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `request.text` and return the encoded audio bytes (MP3).
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<Vec<u8>> {
        (**self).synthesize(request).await
    }
}

/// Mock synthesizer for testing
///
/// Returns fixed bytes and records every text it was asked to speak.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    audio: Vec<u8>,
    fail_on_call: Option<usize>,
    requests: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            audio: b"ID3mock-audio".to_vec(),
            ..Self::default()
        }
    }

    /// Configure the bytes returned for every call
    pub fn with_audio(mut self, audio: &[u8]) -> Self {
        self.audio = audio.to_vec();
        self
    }

    /// Configure the mock to fail on every call
    pub fn with_failure(self) -> Self {
        self.with_failure_on(0)
    }

    /// Configure the mock to fail on the call with this zero-based index
    /// and every call after it.
    pub fn with_failure_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Texts received so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<Vec<u8>> {
        let call = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            requests.push(request.text.to_string());
            requests.len() - 1
        };

        match self.fail_on_call {
            Some(first_failure) if call >= first_failure => Err(MindtrackError::Synthesis {
                message: "mock synthesis failure".to_string(),
            }),
            _ => Ok(self.audio.clone()),
        }
    }
}

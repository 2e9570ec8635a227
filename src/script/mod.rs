//! Script generation: prompt an LLM for meditation text and split it into chapters.

pub mod chapters;
pub mod openai;
pub mod prompt;

use crate::error::{MindtrackError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

pub use chapters::split_into_chapters;
pub use openai::OpenAiScriptGenerator;
pub use prompt::{PromptInputs, render_prompt};

/// Everything a generator needs for one script.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
    pub disease: &'a str,
    pub symptom: &'a str,
    pub additional_instructions: &'a str,
    /// Template with `{disease}`-style placeholders; empty selects the default.
    pub prompt_template: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    pub chapter_count: usize,
}

impl ScriptRequest<'_> {
    /// The user prompt for this request.
    pub fn prompt(&self) -> String {
        render_prompt(
            self.prompt_template,
            &PromptInputs {
                disease: self.disease,
                symptom: self.symptom,
                additional_instructions: self.additional_instructions,
                chapter_count: self.chapter_count,
            },
        )
    }
}

/// Trait for meditation script generators.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    /// Produce the full meditation text, chapters separated by the marker token.
    async fn generate(&self, request: ScriptRequest<'_>) -> Result<String>;
}

#[async_trait]
impl<T: ScriptGenerator + ?Sized> ScriptGenerator for Arc<T> {
    async fn generate(&self, request: ScriptRequest<'_>) -> Result<String> {
        (**self).generate(request).await
    }
}

/// Mock generator for testing
#[derive(Debug)]
pub struct MockScriptGenerator {
    response: String,
    should_fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockScriptGenerator {
    /// Create a mock that returns three short chapters
    pub fn new() -> Self {
        Self {
            response: "Welcome.<break>Breathe.<break>Return.".to_string(),
            should_fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Configure the mock to return a specific script
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on generate
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Rendered prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockScriptGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptGenerator for MockScriptGenerator {
    async fn generate(&self, request: ScriptRequest<'_>) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt());

        if self.should_fail {
            Err(MindtrackError::Generation {
                message: "mock generation failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }
}

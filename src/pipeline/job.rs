//! Job input and progress steps.

use crate::error::{MindtrackError, Result};
use serde::{Deserialize, Serialize};

/// What the user asked for.
///
/// Missing fields deserialize as empty so that [`GenerationRequest::validate`]
/// reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationRequest {
    pub disease: String,
    pub symptom: String,
    pub additional_instructions: String,
}

impl GenerationRequest {
    pub fn new(disease: &str, symptom: &str, additional_instructions: &str) -> Self {
        Self {
            disease: disease.to_string(),
            symptom: symptom.to_string(),
            additional_instructions: additional_instructions.to_string(),
        }
    }

    /// Disease and symptom must contain something besides whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.disease.trim().is_empty() || self.symptom.trim().is_empty() {
            return Err(MindtrackError::InvalidRequest {
                message: "Disease and symptom are required".to_string(),
            });
        }
        Ok(())
    }
}

/// Progress counter values a poller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStep {
    GenerateScript = 0,
    SynthesizeSpeech = 1,
    Assemble = 2,
    Overlay = 3,
    Complete = 4,
}

impl JobStep {
    pub const ALL: [JobStep; 5] = [
        JobStep::GenerateScript,
        JobStep::SynthesizeSpeech,
        JobStep::Assemble,
        JobStep::Overlay,
        JobStep::Complete,
    ];

    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(step: u32) -> Option<Self> {
        Self::ALL.get(step as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStep::GenerateScript => "Generating meditation script",
            JobStep::SynthesizeSpeech => "Synthesizing speech",
            JobStep::Assemble => "Assembling chapters",
            JobStep::Overlay => "Adding background music",
            JobStep::Complete => "Done",
        }
    }
}

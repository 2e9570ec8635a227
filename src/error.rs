//! Error types for mindtrack.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MindtrackError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Pipeline stage errors
    #[error("Failed to fetch settings: {message}")]
    ConfigFetch { message: String },

    #[error("Script generation failed: {message}")]
    Generation { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Audio assembly failed: {message}")]
    Assembly { message: String },

    #[error("Persistence failed: {message}")]
    Persistence { message: String },

    // External tool errors
    #[error("Audio tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} failed with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {limit}")]
    ToolTimedOut { tool: String, limit: String },

    // Session registry errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session already exists: {id}")]
    SessionExists { id: String },

    #[error("Session {id} has already finished")]
    SessionFinished { id: String },

    // Request validation
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl MindtrackError {
    /// Returns true for failures that end a job (every stage error except persistence).
    pub fn is_job_fatal(&self) -> bool {
        !matches!(self, MindtrackError::Persistence { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MindtrackError>;

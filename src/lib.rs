//! mindtrack - personalized guided-meditation audio
//!
//! Turns a condition and symptom into a narrated meditation: LLM script →
//! per-chapter speech → silence-paced assembly → background music → storage.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod session;
pub mod settings;
pub mod speech;
pub mod storage;
pub mod supabase;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

#[cfg(all(test, feature = "server"))]
mod testing;

// Collaborator seams
pub use audio::{AudioToolchain, CommandExecutor};
pub use script::ScriptGenerator;
pub use settings::SettingsStore;
pub use speech::SpeechSynthesizer;
pub use storage::ArtifactStore;

// Pipeline and sessions
pub use pipeline::{GenerationRequest, JobStep, Pipeline, PipelineConfig, PipelineServices};
pub use session::{Session, SessionId, SessionRegistry, SessionStatus};

// Error handling
pub use error::{MindtrackError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

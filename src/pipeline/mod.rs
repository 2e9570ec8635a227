//! Meditation generation pipeline.
//!
//! Each submitted job runs as its own background task and reports progress
//! through the session registry:
//! settings → script (0) → speech (1) → pacing (2) → ambience (3) → persist → done (4).

pub mod job;
pub mod orchestrator;
pub mod workspace;

pub use job::{GenerationRequest, JobStep};
pub use orchestrator::{
    JobHandle, Pipeline, PipelineConfig, PipelineServices, StageTimeouts, interleave_with_silence,
};
pub use workspace::Workspace;

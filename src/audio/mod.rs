//! Audio assembly through the ffmpeg toolchain.

pub mod health;
pub mod overlay;
pub mod toolchain;

pub use health::{HealthStatus, ToolStatus, ToolchainHealth};
pub use overlay::OverlayPlan;
pub use toolchain::{
    AudioToolchain, CommandExecutor, FfmpegToolchain, MockCommandExecutor, MockToolchain,
    SystemCommandExecutor, ToolOperation,
};

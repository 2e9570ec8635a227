//! Audio toolchain diagnostics.
//!
//! Verifies that ffmpeg and ffprobe are installed and reports their versions.
//! Only used by the diagnostics endpoint and `mindtrack check`, never by a job.

use super::toolchain::CommandExecutor;
use crate::defaults;
use serde::Serialize;

/// Result of checking one binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Overall classification of the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Partial,
    Error,
}

/// Diagnostics for both binaries plus a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainHealth {
    pub ffmpeg: ToolStatus,
    pub ffprobe: ToolStatus,
    pub status: HealthStatus,
    pub message: String,
}

impl ToolchainHealth {
    /// Combine two tool checks into a classified report.
    pub fn from_checks(ffmpeg: ToolStatus, ffprobe: ToolStatus) -> Self {
        let (status, message) = match (ffmpeg.installed, ffprobe.installed) {
            (true, true) => (
                HealthStatus::Healthy,
                "FFmpeg and FFprobe are properly installed".to_string(),
            ),
            (true, false) | (false, true) => (
                HealthStatus::Partial,
                failure_message(&ffmpeg, &ffprobe)
                    .unwrap_or_else(|| "Only one of FFmpeg/FFprobe is installed".to_string()),
            ),
            (false, false) => (
                HealthStatus::Error,
                failure_message(&ffmpeg, &ffprobe)
                    .unwrap_or_else(|| "FFmpeg and FFprobe are not installed".to_string()),
            ),
        };

        Self {
            ffmpeg,
            ffprobe,
            status,
            message,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

fn failure_message(ffmpeg: &ToolStatus, ffprobe: &ToolStatus) -> Option<String> {
    let parts: Vec<String> = [("FFmpeg", ffmpeg), ("FFprobe", ffprobe)]
        .into_iter()
        .filter_map(|(name, status)| {
            status
                .error
                .as_ref()
                .map(|e| format!("{name} not found: {e}"))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Extract the version token from a `-version` banner such as
/// `ffmpeg version 6.1.1-3ubuntu5 Copyright (c) ...`.
pub fn parse_version(tool: &str, banner: &str) -> Option<String> {
    let prefix = format!("{tool} version ");
    banner.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(&prefix)?;
        rest.split_whitespace().next().map(str::to_string)
    })
}

/// Run `<tool> -version` and classify the outcome.
pub async fn check_tool<E: CommandExecutor + ?Sized>(executor: &E, tool: &str) -> ToolStatus {
    let args = ["-version".to_string()];
    let outcome =
        tokio::time::timeout(defaults::HEALTH_CHECK_TIMEOUT, executor.execute(tool, &args)).await;

    match outcome {
        Ok(Ok(stdout)) => ToolStatus {
            installed: true,
            version: parse_version(tool, &stdout),
            error: None,
        },
        Ok(Err(e)) => ToolStatus {
            installed: false,
            version: None,
            error: Some(e.to_string()),
        },
        Err(_) => ToolStatus {
            installed: false,
            version: None,
            error: Some(format!(
                "timed out after {}",
                humantime::format_duration(defaults::HEALTH_CHECK_TIMEOUT)
            )),
        },
    }
}

/// Check both binaries.
pub async fn check_toolchain<E: CommandExecutor + ?Sized>(
    executor: &E,
    ffmpeg: &str,
    ffprobe: &str,
) -> ToolchainHealth {
    let ffmpeg_status = check_tool(executor, ffmpeg).await;
    let ffprobe_status = check_tool(executor, ffprobe).await;
    ToolchainHealth::from_checks(ffmpeg_status, ffprobe_status)
}

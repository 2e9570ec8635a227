//! External audio codec operations.
//!
//! Every codec step runs `ffmpeg`/`ffprobe` as a child process through the
//! [`CommandExecutor`] seam, so the orchestration logic can be exercised
//! without the binaries installed.

use super::health::{self, ToolchainHealth};
use super::overlay::{OverlayPlan, mp3_output_args};
use crate::defaults;
use crate::error::{MindtrackError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;

/// Trait for executing external commands (allows mocking in tests).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the stdout of the command on success.
    /// Returns an error if the command fails, is not found, or exceeds its time limit.
    async fn execute(&self, program: &str, args: &[String]) -> Result<String>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String> {
        (**self).execute(program, args).await
    }
}

/// Production command executor using `tokio::process::Command`.
///
/// The child is killed if it outlives `timeout`.
#[derive(Debug, Clone)]
pub struct SystemCommandExecutor {
    timeout: Duration,
}

impl SystemCommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::new(defaults::TOOL_TIMEOUT)
    }
}

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MindtrackError::ToolNotFound {
                        tool: program.to_string(),
                    }
                } else {
                    MindtrackError::ToolFailed {
                        tool: program.to_string(),
                        status: "spawn failed".to_string(),
                        stderr: e.to_string(),
                    }
                }
            })?,
            Err(_) => {
                return Err(MindtrackError::ToolTimedOut {
                    tool: program.to_string(),
                    limit: humantime::format_duration(self.timeout).to_string(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MindtrackError::ToolFailed {
                tool: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// ffmpeg prints its whole banner to stderr; the error is at the end.
fn stderr_tail(stderr: &str) -> String {
    const KEEP_LINES: usize = 5;
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(KEEP_LINES);
    lines[start..].join("\n")
}

/// Mock command executor for testing.
///
/// Records all command executions and returns configured responses.
#[derive(Debug, Default)]
pub struct MockCommandExecutor {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful response to the queue.
    pub fn with_response(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(response.to_string()));
        self
    }

    /// Add an error response to the queue.
    pub fn with_error(self, error: MindtrackError) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CommandExecutor for MockCommandExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((program.to_string(), args.to_vec()));

        // Return the next configured response or a default success
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Codec capabilities the pipeline needs.
#[async_trait]
pub trait AudioToolchain: Send + Sync {
    /// Duration of an audio file in seconds; `0.0` when it cannot be probed.
    async fn probe_duration(&self, path: &Path) -> f64;

    /// Write `seconds` of stereo silence to `output`.
    async fn synthesize_silence(&self, seconds: u32, output: &Path) -> Result<()>;

    /// Join `inputs`, in order, into `output`. `inputs` must not be empty.
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Mix `background` under `main`, looping or trimming it to `main`'s length.
    async fn mix_with_background(&self, main: &Path, background: &Path, output: &Path)
    -> Result<()>;

    /// Report whether the underlying binaries are usable.
    async fn health(&self) -> ToolchainHealth;
}

#[async_trait]
impl<T: AudioToolchain + ?Sized> AudioToolchain for Arc<T> {
    async fn probe_duration(&self, path: &Path) -> f64 {
        (**self).probe_duration(path).await
    }

    async fn synthesize_silence(&self, seconds: u32, output: &Path) -> Result<()> {
        (**self).synthesize_silence(seconds, output).await
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        (**self).concatenate(inputs, output).await
    }

    async fn mix_with_background(
        &self,
        main: &Path,
        background: &Path,
        output: &Path,
    ) -> Result<()> {
        (**self).mix_with_background(main, background, output).await
    }

    async fn health(&self) -> ToolchainHealth {
        (**self).health().await
    }
}

/// [`AudioToolchain`] backed by the ffmpeg/ffprobe binaries.
pub struct FfmpegToolchain<E: CommandExecutor = SystemCommandExecutor> {
    executor: E,
    ffmpeg: String,
    ffprobe: String,
    background_gain: f32,
}

impl FfmpegToolchain<SystemCommandExecutor> {
    /// Toolchain using the binaries on `PATH`, killing any run longer than `timeout`.
    pub fn system(timeout: Duration) -> Self {
        Self::new(SystemCommandExecutor::new(timeout))
    }
}

impl<E: CommandExecutor> FfmpegToolchain<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            background_gain: defaults::BACKGROUND_GAIN,
        }
    }

    /// Use explicit binary paths instead of `PATH` lookup.
    pub fn with_binaries(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    pub fn with_background_gain(mut self, gain: f32) -> Self {
        self.background_gain = gain;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<()> {
        self.executor
            .execute(&self.ffmpeg, &args)
            .await
            .map(|_| ())
            .map_err(into_assembly)
    }
}

/// Tool failures surface to the job as assembly errors.
fn into_assembly(error: MindtrackError) -> MindtrackError {
    match error {
        MindtrackError::Assembly { .. } => error,
        other => MindtrackError::Assembly {
            message: other.to_string(),
        },
    }
}

/// Pull `format.duration` out of `ffprobe -print_format json -show_format` output.
pub fn parse_probe_output(stdout: &str) -> Option<f64> {
    let json: serde_json::Value = serde_json::from_str(stdout).ok()?;
    let duration = &json["format"]["duration"];
    let secs = match duration {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

/// One line of a concat demuxer list.
///
/// Paths are single-quoted, so an embedded quote has to close the quote,
/// emit an escaped quote, and reopen.
fn concat_list_entry(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
    format!("file '{path}'\n")
}

#[async_trait]
impl<E: CommandExecutor> AudioToolchain for FfmpegToolchain<E> {
    async fn probe_duration(&self, path: &Path) -> f64 {
        let args: Vec<String> = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            path.to_string_lossy().into_owned(),
        ];

        match self.executor.execute(&self.ffprobe, &args).await {
            Ok(stdout) => match parse_probe_output(&stdout) {
                Some(secs) => secs,
                None => {
                    tracing::warn!(path = %path.display(), "ffprobe output has no duration");
                    0.0
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to probe duration");
                0.0
            }
        }
    }

    async fn synthesize_silence(&self, seconds: u32, output: &Path) -> Result<()> {
        let out = mp3_output_args(output);

        let mut primary = vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "anullsrc=channel_layout=stereo:sample_rate={}",
                defaults::SILENCE_SAMPLE_RATE
            ),
            "-t".to_string(),
            seconds.to_string(),
        ];
        primary.extend(out.clone());

        let Err(first) = self.executor.execute(&self.ffmpeg, &primary).await else {
            return Ok(());
        };
        tracing::warn!(error = %first, "anullsrc unavailable, falling back to muted sine source");

        let mut fallback = vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("sine=frequency=1000:duration={seconds}"),
            "-af".to_string(),
            "volume=0".to_string(),
            "-ac".to_string(),
            "2".to_string(),
        ];
        fallback.extend(out);

        self.executor
            .execute(&self.ffmpeg, &fallback)
            .await
            .map(|_| ())
            .map_err(|e| MindtrackError::Assembly {
                message: format!("could not generate silence: {e}"),
            })
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(MindtrackError::Assembly {
                message: "nothing to concatenate".to_string(),
            });
        }

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let list_path = parent.join("filelist.txt");

        let mut list = String::new();
        for input in inputs {
            list.push_str(&concat_list_entry(&std::path::absolute(input)?));
        }
        tokio::fs::write(&list_path, list).await?;

        let mut args = vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().into_owned(),
        ];
        args.extend(mp3_output_args(output));

        let result = self.ffmpeg(args).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            tracing::warn!(path = %list_path.display(), error = %e, "failed to remove concat list");
        }

        result
    }

    async fn mix_with_background(
        &self,
        main: &Path,
        background: &Path,
        output: &Path,
    ) -> Result<()> {
        let narration = self.probe_duration(main).await;
        let music = self.probe_duration(background).await;
        let plan = OverlayPlan::for_durations(narration, music);
        tracing::debug!(narration, music, ?plan, "mixing background music");

        self.ffmpeg(plan.ffmpeg_args(main, background, output, self.background_gain))
            .await
    }

    async fn health(&self) -> ToolchainHealth {
        health::check_toolchain(&self.executor, &self.ffmpeg, &self.ffprobe).await
    }
}

/// Codec operation a [`MockToolchain`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOperation {
    Silence,
    Concatenate,
    Mix,
}

/// In-process toolchain for tests: writes small placeholder files instead of
/// running ffmpeg, and records what it was asked to do.
#[derive(Debug)]
pub struct MockToolchain {
    duration_secs: f64,
    failing: Vec<ToolOperation>,
    health: ToolchainHealth,
    operations: Mutex<Vec<String>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        let installed = health::ToolStatus {
            installed: true,
            version: Some("6.1.1".to_string()),
            error: None,
        };
        Self {
            duration_secs: 600.0,
            failing: Vec::new(),
            health: ToolchainHealth::from_checks(installed.clone(), installed),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Duration reported by `probe_duration`.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_secs = seconds;
        self
    }

    /// Make every call of `operation` fail with an assembly error.
    pub fn with_failure(mut self, operation: ToolOperation) -> Self {
        self.failing.push(operation);
        self
    }

    pub fn with_health(mut self, health: ToolchainHealth) -> Self {
        self.health = health;
        self
    }

    /// Operations performed so far, e.g. `"silence 60"`, `"concat 5"`, `"mix"`.
    pub fn operations(&self) -> Vec<String> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn log(&self, entry: String) {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn check(&self, operation: ToolOperation) -> Result<()> {
        if self.failing.contains(&operation) {
            return Err(MindtrackError::Assembly {
                message: format!("mock {operation:?} failure"),
            });
        }
        Ok(())
    }
}

impl Default for MockToolchain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioToolchain for MockToolchain {
    async fn probe_duration(&self, path: &Path) -> f64 {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            self.duration_secs
        } else {
            0.0
        }
    }

    async fn synthesize_silence(&self, seconds: u32, output: &Path) -> Result<()> {
        self.log(format!("silence {seconds}"));
        self.check(ToolOperation::Silence)?;
        tokio::fs::write(output, format!("silence:{seconds}")).await?;
        Ok(())
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.log(format!("concat {}", inputs.len()));
        self.check(ToolOperation::Concatenate)?;
        if inputs.is_empty() {
            return Err(MindtrackError::Assembly {
                message: "nothing to concatenate".to_string(),
            });
        }

        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }

    async fn mix_with_background(
        &self,
        main: &Path,
        background: &Path,
        output: &Path,
    ) -> Result<()> {
        self.log("mix".to_string());
        self.check(ToolOperation::Mix)?;
        let mut mixed = tokio::fs::read(main).await?;
        mixed.extend(tokio::fs::read(background).await?);
        tokio::fs::write(output, mixed).await?;
        Ok(())
    }

    async fn health(&self) -> ToolchainHealth {
        self.health.clone()
    }
}

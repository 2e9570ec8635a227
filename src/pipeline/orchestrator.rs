//! Runs one generation job from prompt to persisted audio.

use super::job::{GenerationRequest, JobStep};
use super::workspace::Workspace;
use crate::audio::AudioToolchain;
use crate::config::Config;
use crate::defaults;
use crate::error::{MindtrackError, Result};
use crate::script::{ScriptGenerator, ScriptRequest, split_into_chapters};
use crate::session::{Session, SessionId, SessionRegistry, SessionUpdate};
use crate::settings::{Settings, SettingsStore};
use crate::speech::{SpeechRequest, SpeechSynthesizer};
use crate::storage::{ArtifactStore, MeditationRecord};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Per-call limits for external work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTimeouts {
    pub llm: Duration,
    /// Applies to each chapter separately.
    pub speech: Duration,
    pub tool: Duration,
    pub storage: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            llm: defaults::LLM_TIMEOUT,
            speech: defaults::SPEECH_TIMEOUT,
            tool: defaults::TOOL_TIMEOUT,
            storage: defaults::STORAGE_TIMEOUT,
        }
    }
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent directory of the per-job workspaces
    pub workspace_root: PathBuf,
    /// Background music mixed under every job
    pub music_path: PathBuf,
    /// Token separating chapters in generated text
    pub chapter_marker: String,
    pub timeouts: StageTimeouts,
    /// Fail the job when the artifact store rejects the result
    pub strict_persistence: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: defaults::workspace_root(),
            music_path: PathBuf::from(defaults::MUSIC_PATH),
            chapter_marker: defaults::CHAPTER_MARKER.to_string(),
            timeouts: StageTimeouts::default(),
            strict_persistence: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workspace_root: config.paths.workspace_root.clone(),
            music_path: config.paths.music_path.clone(),
            chapter_marker: defaults::CHAPTER_MARKER.to_string(),
            timeouts: StageTimeouts {
                llm: config.timeouts.llm,
                speech: config.timeouts.speech,
                tool: config.timeouts.tool,
                storage: config.timeouts.storage,
            },
            strict_persistence: config.storage.strict,
        }
    }
}

/// External collaborators a job calls into.
#[derive(Clone)]
pub struct PipelineServices {
    pub settings: Arc<dyn SettingsStore>,
    pub generator: Arc<dyn ScriptGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub toolchain: Arc<dyn AudioToolchain>,
    pub store: Arc<dyn ArtifactStore>,
}

/// A submitted job.
pub struct JobHandle {
    pub session_id: SessionId,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Wait until the job has recorded its outcome and cleaned up.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            tracing::error!(session_id = %self.session_id, error = %e, "job task failed");
        }
    }
}

/// What a successful run leaves behind.
struct Outcome {
    audio_location: String,
    /// The final file is served from the workspace, so it must survive cleanup.
    keep_final: bool,
}

/// Generation pipeline: script → speech → pacing → ambience → persistence.
pub struct Pipeline {
    config: PipelineConfig,
    registry: SessionRegistry,
    services: PipelineServices,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: SessionRegistry, services: PipelineServices) -> Self {
        Self {
            config,
            registry,
            services,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// Validate the request, register a session, and start the job in the background.
    ///
    /// Returns as soon as the session exists; progress is observable only
    /// through the registry.
    pub fn submit(self: &Arc<Self>, request: GenerationRequest) -> Result<JobHandle> {
        request.validate()?;

        let session_id = SessionId::new();
        self.registry.create(session_id)?;
        tracing::info!(session_id = %session_id, disease = %request.disease, "job submitted");

        let pipeline = Arc::clone(self);
        let span = tracing::info_span!("job", session_id = %session_id);
        let task = tokio::spawn(
            async move {
                let runner = Arc::clone(&pipeline);
                let job = tokio::spawn(
                    async move { runner.run_job(session_id, &request).await }.in_current_span(),
                );

                match job.await {
                    Ok(Ok(_)) | Ok(Err(_)) => {}
                    Err(e) => {
                        // A panic inside the job must still end the session.
                        tracing::error!(error = %e, "job aborted");
                        pipeline.record(session_id, SessionUpdate::failed(defaults::GENERIC_FAILURE));
                        remove_dir_best_effort(&Workspace::dir_for(
                            &pipeline.config.workspace_root,
                            session_id,
                        ))
                        .await;
                    }
                }
            }
            .instrument(span),
        );

        Ok(JobHandle { session_id, task })
    }

    /// Run a registered session's job to completion or failure.
    ///
    /// The outcome is recorded in the registry; the returned value is the same
    /// outcome for callers that run the job inline.
    pub async fn run_job(&self, id: SessionId, request: &GenerationRequest) -> Result<String> {
        let started = Instant::now();

        let fetched = bounded(
            self.config.timeouts.storage,
            "settings fetch",
            self.services.settings.fetch(),
            config_fetch_error,
        )
        .await;
        let settings = match fetched {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                let e = if matches!(e, MindtrackError::ConfigFetch { .. }) {
                    e
                } else {
                    MindtrackError::ConfigFetch {
                        message: e.to_string(),
                    }
                };
                tracing::error!(error = %e, "could not load settings");
                self.record(id, SessionUpdate::failed(failure_message(&e)));
                return Err(e);
            }
        };

        let workspace = match Workspace::create(&self.config.workspace_root, id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                let e = MindtrackError::Assembly {
                    message: format!("could not create workspace: {e}"),
                };
                tracing::error!(error = %e, "job failed");
                self.record(id, SessionUpdate::failed(failure_message(&e)));
                return Err(e);
            }
        };

        match self.execute(id, request, &settings, &workspace).await {
            Ok(outcome) => {
                self.record(
                    id,
                    SessionUpdate::completed(JobStep::Complete.number(), &outcome.audio_location),
                );
                tracing::info!(
                    location = %outcome.audio_location,
                    elapsed = %humantime::format_duration(round_secs(started.elapsed())),
                    "job completed"
                );

                if outcome.keep_final {
                    workspace.remove_files(&intermediates(&workspace, settings.chapter_count)).await;
                } else {
                    workspace.remove_all().await;
                }
                Ok(outcome.audio_location)
            }
            Err(e) => {
                tracing::error!(error = %e, "job failed");
                self.record(id, SessionUpdate::failed(failure_message(&e)));
                workspace.remove_all().await;
                Err(e)
            }
        }
    }

    /// Steps 0 to 3 plus persistence. Chapters padded in by the splitter are
    /// rendered as short silence rather than sent to the synthesizer.
    async fn execute(
        &self,
        id: SessionId,
        request: &GenerationRequest,
        settings: &Settings,
        workspace: &Workspace,
    ) -> Result<Outcome> {
        let timeouts = self.config.timeouts;
        let toolchain = &self.services.toolchain;

        // Step 0: script
        self.advance(id, JobStep::GenerateScript);
        let script_request = ScriptRequest {
            disease: request.disease.trim(),
            symptom: request.symptom.trim(),
            additional_instructions: request.additional_instructions.trim(),
            prompt_template: &settings.prompt_template,
            model: &settings.openai_model,
            api_key: &settings.openai_api_key,
            chapter_count: settings.chapter_count,
        };
        let text = bounded(
            timeouts.llm,
            "script generation",
            self.services.generator.generate(script_request),
            generation_error,
        )
        .await?;
        let chapters =
            split_into_chapters(&text, &self.config.chapter_marker, settings.chapter_count);
        tracing::info!(chapters = chapters.len(), chars = text.len(), "script ready");

        // Step 1: one audio file per chapter, strictly in order
        self.advance(id, JobStep::SynthesizeSpeech);
        let mut chapter_paths = Vec::with_capacity(chapters.len());
        for (index, chapter) in chapters.iter().enumerate() {
            let path = workspace.chapter_path(index);

            if chapter.is_empty() {
                tracing::debug!(chapter = index + 1, "empty chapter, rendering placeholder silence");
                bounded(
                    timeouts.tool,
                    "placeholder silence",
                    toolchain.synthesize_silence(defaults::EMPTY_CHAPTER_SECS, &path),
                    assembly_error,
                )
                .await?;
            } else {
                let speech = SpeechRequest {
                    text: chapter,
                    voice_id: &settings.elevenlabs_voice_id,
                    model_id: &settings.elevenlabs_model,
                    speed: settings.speech_speed,
                    api_key: &settings.elevenlabs_api_key,
                };
                let audio = bounded(
                    timeouts.speech,
                    &format!("speech for chapter {}", index + 1),
                    self.services.synthesizer.synthesize(speech),
                    synthesis_error,
                )
                .await?;
                tokio::fs::write(&path, &audio)
                    .await
                    .map_err(|e| synthesis_error(format!("could not write {}: {e}", path.display())))?;
                tracing::debug!(chapter = index + 1, bytes = audio.len(), "chapter synthesized");
            }

            chapter_paths.push(path);
        }

        // Step 2: chapters separated by silence
        self.advance(id, JobStep::Assemble);
        let silence = (chapter_paths.len() > 1 && settings.silence_seconds > 0)
            .then(|| workspace.silence_path());
        if let Some(silence_path) = &silence {
            bounded(
                timeouts.tool,
                "silence generation",
                toolchain.synthesize_silence(settings.silence_seconds, silence_path),
                assembly_error,
            )
            .await?;
        }
        let sequence = interleave_with_silence(&chapter_paths, silence.as_deref());
        let combined = workspace.combined_path();
        bounded(
            timeouts.tool,
            "concatenation",
            toolchain.concatenate(&sequence, &combined),
            assembly_error,
        )
        .await?;

        // Step 3: background music
        self.advance(id, JobStep::Overlay);
        let music = &self.config.music_path;
        if !tokio::fs::try_exists(music).await.unwrap_or(false) {
            return Err(assembly_error(format!(
                "Background music not found at: {}",
                music.display()
            )));
        }
        let final_path = workspace.final_path();
        bounded(
            timeouts.tool,
            "background overlay",
            toolchain.mix_with_background(&combined, music, &final_path),
            assembly_error,
        )
        .await?;

        // Persist
        let duration_seconds = tokio::time::timeout(timeouts.tool, toolchain.probe_duration(&final_path))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!("duration probe timed out");
                0.0
            });
        let record = MeditationRecord {
            id: id.to_string(),
            disease: request.disease.trim().to_string(),
            symptom: request.symptom.trim().to_string(),
            additional_instructions: request.additional_instructions.trim().to_string(),
            meditation_text: text,
            chapter_count: chapters.len(),
            duration_seconds,
            audio_url: None,
            created_at: chrono::Utc::now(),
        };

        let persisted = bounded(
            timeouts.storage,
            "persistence",
            self.services.store.persist(&record, &final_path),
            persistence_error,
        )
        .await;

        match persisted {
            Ok(location) => Ok(Outcome {
                audio_location: location,
                keep_final: false,
            }),
            Err(e) if self.config.strict_persistence || e.is_job_fatal() => Err(e),
            Err(e) => {
                let local = std::path::absolute(&final_path).unwrap_or(final_path);
                tracing::warn!(
                    error = %e,
                    fallback = %local.display(),
                    "persistence failed, serving local artifact"
                );
                Ok(Outcome {
                    audio_location: local.to_string_lossy().into_owned(),
                    keep_final: true,
                })
            }
        }
    }

    fn advance(&self, id: SessionId, step: JobStep) {
        tracing::info!(step = step.number(), "{}", step.label());
        self.record(id, SessionUpdate::step(step.number()));
    }

    /// Registry writes never abort a job: a session that was evicted or
    /// removed mid-run simply stops being observable.
    fn record(&self, id: SessionId, update: SessionUpdate) -> Option<Session> {
        match self.registry.update(id, update) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "could not update session");
                None
            }
        }
    }
}

/// Chapters in order with `silence` between neighbours, never at the ends.
pub fn interleave_with_silence(chapters: &[PathBuf], silence: Option<&Path>) -> Vec<PathBuf> {
    let mut sequence = Vec::with_capacity(chapters.len() * 2);
    for (index, chapter) in chapters.iter().enumerate() {
        if index > 0
            && let Some(silence) = silence
        {
            sequence.push(silence.to_path_buf());
        }
        sequence.push(chapter.clone());
    }
    sequence
}

fn intermediates(workspace: &Workspace, chapter_count: usize) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = (0..chapter_count.max(1))
        .map(|i| workspace.chapter_path(i))
        .collect();
    paths.push(workspace.silence_path());
    paths.push(workspace.combined_path());
    paths
}

fn failure_message(error: &MindtrackError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        defaults::GENERIC_FAILURE.to_string()
    } else {
        message
    }
}

/// Apply `limit` to an external call; expiry becomes the stage's own error kind.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
    stage_error: fn(String) -> MindtrackError,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(stage_error(format!(
            "{what} timed out after {}",
            humantime::format_duration(limit)
        ))),
    }
}

async fn remove_dir_best_effort(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %dir.display(), error = %e, "failed to remove workspace");
    }
}

fn round_secs(elapsed: Duration) -> Duration {
    Duration::from_secs(elapsed.as_secs())
}

fn config_fetch_error(message: String) -> MindtrackError {
    MindtrackError::ConfigFetch { message }
}

fn generation_error(message: String) -> MindtrackError {
    MindtrackError::Generation { message }
}

fn synthesis_error(message: String) -> MindtrackError {
    MindtrackError::Synthesis { message }
}

fn assembly_error(message: String) -> MindtrackError {
    MindtrackError::Assembly { message }
}

fn persistence_error(message: String) -> MindtrackError {
    MindtrackError::Persistence { message }
}

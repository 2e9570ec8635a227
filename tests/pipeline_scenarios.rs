//! End-to-end job scenarios against in-process collaborators.
//!
//! No network and no ffmpeg: the speech, script and codec seams are mocks and
//! the artifact store writes to a temporary directory.

use async_trait::async_trait;
use mindtrack::audio::{MockToolchain, ToolOperation};
use mindtrack::pipeline::{
    GenerationRequest, Pipeline, PipelineConfig, PipelineServices, StageTimeouts, Workspace,
};
use mindtrack::script::MockScriptGenerator;
use mindtrack::session::{Session, SessionRegistry, SessionStatus, sweep_once};
use mindtrack::settings::{InMemorySettingsStore, Settings, SettingsStore, SettingsUpdate};
use mindtrack::speech::{MockSynthesizer, SpeechRequest, SpeechSynthesizer};
use mindtrack::storage::{ArtifactStore, LocalArtifactStore, MeditationRecord};
use mindtrack::{MindtrackError, SessionId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Store that always rejects the artifact.
struct RejectingStore;

#[async_trait]
impl ArtifactStore for RejectingStore {
    async fn persist(&self, _record: &MeditationRecord, _audio: &Path) -> mindtrack::Result<String> {
        Err(MindtrackError::Persistence {
            message: "bucket does not exist".to_string(),
        })
    }
}

/// Settings backend that never answers.
struct HangingSettings;

#[async_trait]
impl SettingsStore for HangingSettings {
    async fn fetch(&self) -> mindtrack::Result<Settings> {
        std::future::pending().await
    }

    async fn update(&self, _update: &SettingsUpdate) -> mindtrack::Result<Settings> {
        std::future::pending().await
    }
}

/// Synthesizer that changes the stored settings before every chapter.
struct EditingSynthesizer {
    store: Arc<InMemorySettingsStore>,
    inner: MockSynthesizer,
}

#[async_trait]
impl SpeechSynthesizer for EditingSynthesizer {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> mindtrack::Result<Vec<u8>> {
        self.store
            .update(&SettingsUpdate {
                silence_seconds: Some(5),
                chapter_count: Some(7),
                ..SettingsUpdate::default()
            })
            .await?;
        self.inner.synthesize(request).await
    }
}

/// Synthesizer that runs an eviction sweep with zero retention during the
/// first chapter, while the job is still in flight.
struct SweepingSynthesizer {
    registry: SessionRegistry,
    workspace_root: PathBuf,
    swept: AtomicBool,
    inner: MockSynthesizer,
}

#[async_trait]
impl SpeechSynthesizer for SweepingSynthesizer {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> mindtrack::Result<Vec<u8>> {
        if !self.swept.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            sweep_once(&self.registry, Duration::ZERO, &self.workspace_root).await;
        }
        self.inner.synthesize(request).await
    }
}

struct Scenario {
    script: &'static str,
    settings: Settings,
    settings_unavailable: bool,
    /// Replaces the in-memory settings store built from `settings`.
    settings_store: Option<Arc<dyn SettingsStore>>,
    synthesizer: MockSynthesizer,
    /// Replaces `synthesizer` in the pipeline.
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    registry: SessionRegistry,
    timeouts: StageTimeouts,
    toolchain: MockToolchain,
    reject_persistence: bool,
    strict_persistence: bool,
    with_music: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            script: "Welcome to this moment.<break>Feel the breath.<break>Return gently.",
            settings: Settings::default(),
            settings_unavailable: false,
            settings_store: None,
            synthesizer: MockSynthesizer::new(),
            speech: None,
            registry: SessionRegistry::new(),
            timeouts: StageTimeouts::default(),
            toolchain: MockToolchain::new(),
            reject_persistence: false,
            strict_persistence: false,
            with_music: true,
        }
    }
}

struct Run {
    dir: TempDir,
    pipeline: Arc<Pipeline>,
    generator: Arc<MockScriptGenerator>,
    synthesizer: Arc<MockSynthesizer>,
    toolchain: Arc<MockToolchain>,
}

impl Run {
    fn workspace_root(&self) -> PathBuf {
        self.dir.path().join("temp")
    }

    fn archive(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    fn music(&self) -> PathBuf {
        self.dir.path().join("music.mp3")
    }

    fn workspace(&self, id: SessionId) -> PathBuf {
        Workspace::dir_for(&self.workspace_root(), id)
    }

    async fn generate(&self, disease: &str, symptom: &str) -> (SessionId, Session) {
        let handle = self
            .pipeline
            .submit(GenerationRequest::new(disease, symptom, ""))
            .unwrap();
        let id = handle.session_id;
        handle.finished().await;
        let session = self.pipeline.registry().get(id).unwrap();
        (id, session)
    }
}

impl Scenario {
    fn start(self) -> Run {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.mp3");
        if self.with_music {
            std::fs::write(&music, b"music").unwrap();
        }

        let generator = Arc::new(MockScriptGenerator::new().with_response(self.script));
        let synthesizer = Arc::new(self.synthesizer);
        let toolchain = Arc::new(self.toolchain);

        let settings: Arc<dyn SettingsStore> = match self.settings_store {
            Some(store) => store,
            None if self.settings_unavailable => {
                Arc::new(InMemorySettingsStore::new(self.settings).with_failure())
            }
            None => Arc::new(InMemorySettingsStore::new(self.settings)),
        };
        let store: Arc<dyn ArtifactStore> = if self.reject_persistence {
            Arc::new(RejectingStore)
        } else {
            Arc::new(LocalArtifactStore::new(dir.path().join("archive")))
        };

        let config = PipelineConfig {
            workspace_root: dir.path().join("temp"),
            music_path: music,
            strict_persistence: self.strict_persistence,
            timeouts: self.timeouts,
            ..PipelineConfig::default()
        };
        let speech: Arc<dyn SpeechSynthesizer> = match self.speech {
            Some(speech) => speech,
            None => synthesizer.clone(),
        };
        let services = PipelineServices {
            settings,
            generator: generator.clone(),
            synthesizer: speech,
            toolchain: toolchain.clone(),
            store,
        };

        Run {
            pipeline: Arc::new(Pipeline::new(config, self.registry, services)),
            dir,
            generator,
            synthesizer,
            toolchain,
        }
    }
}

#[tokio::test]
async fn migraine_job_completes_with_archived_audio() {
    let run = Scenario::default().start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_step, 4);
    assert_eq!(session.error_message, None);

    let location = PathBuf::from(session.audio_location.unwrap());
    assert!(location.is_absolute());
    assert!(location.starts_with(std::path::absolute(run.archive()).unwrap()));
    assert!(location.exists());

    // Chapters in order, silence between them, then the background mix.
    assert_eq!(
        run.synthesizer.requests(),
        ["Welcome to this moment.", "Feel the breath.", "Return gently."]
    );
    assert_eq!(run.toolchain.operations(), ["silence 60", "concat 5", "mix"]);

    let prompt = &run.generator.prompts()[0];
    assert!(prompt.contains("migraine"));
    assert!(prompt.contains("tension"));

    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn archived_record_describes_the_job() {
    let run = Scenario {
        toolchain: MockToolchain::new().with_duration(612.5),
        ..Scenario::default()
    }
    .start();

    let (id, _) = run.generate("asthma", "tight chest").await;

    let record_path = run.archive().join(id.to_string()).join("record.json");
    let record: MeditationRecord =
        serde_json::from_slice(&std::fs::read(record_path).unwrap()).unwrap();

    assert_eq!(record.id, id.to_string());
    assert_eq!(record.disease, "asthma");
    assert_eq!(record.symptom, "tight chest");
    assert_eq!(record.chapter_count, 3);
    assert_eq!(record.duration_seconds, 612.5);
    assert!(record.meditation_text.contains("<break>"));
    assert!(record.audio_url.is_some());
}

#[tokio::test]
async fn missing_music_fails_at_overlay_and_cleans_up() {
    let run = Scenario {
        with_music: false,
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 3);
    assert_eq!(session.audio_location, None);
    let message = session.error_message.unwrap();
    assert!(message.contains("Background music not found at:"), "{message}");
    assert!(message.contains(&run.music().display().to_string()));

    assert!(!run.toolchain.operations().contains(&"mix".to_string()));
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn short_script_is_padded_with_placeholder_chapter() {
    let run = Scenario {
        script: "Intro<break>Body",
        ..Scenario::default()
    }
    .start();

    let (_, session) = run.generate("insomnia", "racing thoughts").await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(run.synthesizer.requests(), ["Intro", "Body"]);
    assert_eq!(
        run.toolchain.operations(),
        ["silence 1", "silence 60", "concat 5", "mix"]
    );
}

#[tokio::test]
async fn surplus_chapters_merge_into_the_last() {
    let run = Scenario {
        script: "A<break>B<break>C<break>D",
        ..Scenario::default()
    }
    .start();

    run.generate("flu", "fatigue").await;

    assert_eq!(run.synthesizer.requests(), ["A", "B", "C D"]);
}

#[tokio::test]
async fn single_chapter_skips_silence() {
    let run = Scenario {
        script: "Just one chapter.",
        settings: Settings {
            chapter_count: 1,
            ..Settings::default()
        },
        ..Scenario::default()
    }
    .start();

    let (_, session) = run.generate("stress", "tight jaw").await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(run.toolchain.operations(), ["concat 1", "mix"]);
}

#[tokio::test]
async fn zero_silence_setting_concatenates_chapters_directly() {
    let run = Scenario {
        settings: Settings {
            silence_seconds: 0,
            ..Settings::default()
        },
        ..Scenario::default()
    }
    .start();

    run.generate("stress", "tight jaw").await;

    assert_eq!(run.toolchain.operations(), ["concat 3", "mix"]);
}

#[tokio::test]
async fn unavailable_settings_fail_before_any_work() {
    let run = Scenario {
        settings_unavailable: true,
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 0);
    assert!(
        session
            .error_message
            .unwrap()
            .starts_with("Failed to fetch settings")
    );
    assert!(run.generator.prompts().is_empty());
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn generation_failure_stops_at_step_zero() {
    let dir = TempDir::new().unwrap();
    let music = dir.path().join("music.mp3");
    std::fs::write(&music, b"music").unwrap();
    let synthesizer = Arc::new(MockSynthesizer::new());

    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig {
            workspace_root: dir.path().join("temp"),
            music_path: music,
            ..PipelineConfig::default()
        },
        SessionRegistry::new(),
        PipelineServices {
            settings: Arc::new(InMemorySettingsStore::new(Settings::default())),
            generator: Arc::new(MockScriptGenerator::new().with_failure()),
            synthesizer: synthesizer.clone(),
            toolchain: Arc::new(MockToolchain::new()),
            store: Arc::new(LocalArtifactStore::new(dir.path().join("archive"))),
        },
    ));

    let handle = pipeline
        .submit(GenerationRequest::new("migraine", "tension", ""))
        .unwrap();
    let id = handle.session_id;
    handle.finished().await;

    let session = pipeline.registry().get(id).unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 0);
    assert!(
        session
            .error_message
            .unwrap()
            .starts_with("Script generation failed")
    );
    assert!(synthesizer.requests().is_empty());
    assert!(!Workspace::dir_for(&dir.path().join("temp"), id).exists());
}

#[tokio::test]
async fn synthesis_failure_mid_job_removes_workspace() {
    let run = Scenario {
        synthesizer: MockSynthesizer::new().with_failure_on(1),
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 1);
    assert!(
        session
            .error_message
            .unwrap()
            .starts_with("Speech synthesis failed")
    );
    // No chapter after the failing one is attempted.
    assert_eq!(run.synthesizer.requests().len(), 2);
    assert!(run.toolchain.operations().is_empty());
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn concatenation_failure_is_reported_at_step_two() {
    let run = Scenario {
        toolchain: MockToolchain::new().with_failure(ToolOperation::Concatenate),
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 2);
    assert!(
        session
            .error_message
            .unwrap()
            .starts_with("Audio assembly failed")
    );
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn rejected_persistence_serves_local_artifact() {
    let run = Scenario {
        reject_persistence: true,
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_step, 4);

    let location = PathBuf::from(session.audio_location.unwrap());
    assert!(location.is_absolute());
    assert_eq!(location.file_name().unwrap(), "final.mp3");
    assert!(location.exists());

    // Only the final artifact survives in the workspace.
    let workspace = run.workspace(id);
    assert!(!workspace.join("chapter1.mp3").exists());
    assert!(!workspace.join("silence.mp3").exists());
    assert!(!workspace.join("combined.mp3").exists());
}

#[tokio::test]
async fn strict_persistence_fails_the_job() {
    let run = Scenario {
        reject_persistence: true,
        strict_persistence: true,
        ..Scenario::default()
    }
    .start();

    let (id, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(
        session.error_message.as_deref(),
        Some("Persistence failed: bucket does not exist")
    );
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn invalid_request_creates_no_session() {
    let run = Scenario::default().start();

    let err = run
        .pipeline
        .submit(GenerationRequest::new("", "tension", ""))
        .err()
        .unwrap();

    assert!(matches!(err, MindtrackError::InvalidRequest { .. }));
    assert!(run.pipeline.registry().is_empty());
}

#[tokio::test]
async fn concurrent_jobs_get_isolated_workspaces() {
    let run = Scenario {
        reject_persistence: true,
        ..Scenario::default()
    }
    .start();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            run.pipeline
                .submit(GenerationRequest::new(&format!("condition {i}"), "pain", ""))
                .unwrap()
        })
        .collect();
    let ids: Vec<SessionId> = handles.iter().map(|h| h.session_id).collect();
    for handle in handles {
        handle.finished().await;
    }

    let mut locations = Vec::new();
    for id in &ids {
        let session = run.pipeline.registry().get(*id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        let location = session.audio_location.unwrap();
        assert!(location.contains(&id.to_string()));
        locations.push(location);
    }
    locations.sort();
    locations.dedup();
    assert_eq!(locations.len(), 4);
}

#[tokio::test]
async fn hung_settings_backend_times_out_before_any_step() {
    let run = Scenario {
        settings_store: Some(Arc::new(HangingSettings)),
        timeouts: StageTimeouts {
            storage: Duration::from_millis(50),
            ..StageTimeouts::default()
        },
        ..Scenario::default()
    }
    .start();

    let handle = run
        .pipeline
        .submit(GenerationRequest::new("migraine", "tension", ""))
        .unwrap();
    let id = handle.session_id;
    tokio::time::timeout(Duration::from_secs(5), handle.finished())
        .await
        .unwrap();

    let session = run.pipeline.registry().get(id).unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.current_step, 0);
    let message = session.error_message.unwrap();
    assert!(message.contains("settings fetch timed out"), "{message}");
    assert!(run.generator.prompts().is_empty());
    assert!(!run.workspace(id).exists());
}

#[tokio::test]
async fn settings_changed_mid_job_do_not_affect_it() {
    let store = Arc::new(InMemorySettingsStore::new(Settings::default()));
    let run = Scenario {
        settings_store: Some(store.clone()),
        speech: Some(Arc::new(EditingSynthesizer {
            store: store.clone(),
            inner: MockSynthesizer::new(),
        })),
        ..Scenario::default()
    }
    .start();

    let (_, session) = run.generate("migraine", "tension").await;

    assert_eq!(session.status, SessionStatus::Completed);
    // Still three chapters with the silence length read at job start.
    assert_eq!(run.toolchain.operations(), ["silence 60", "concat 5", "mix"]);
    assert_eq!(store.fetch().await.unwrap().silence_seconds, 5);
}

#[tokio::test]
async fn sweep_during_a_running_job_leaves_it_to_finish() {
    let registry = SessionRegistry::new();
    let mut run = Scenario {
        registry: registry.clone(),
        ..Scenario::default()
    }
    .start();

    // Swap in a synthesizer that sweeps the job's own registry mid-run.
    let services = PipelineServices {
        synthesizer: Arc::new(SweepingSynthesizer {
            registry: registry.clone(),
            workspace_root: run.workspace_root(),
            swept: AtomicBool::new(false),
            inner: MockSynthesizer::new(),
        }),
        ..run.pipeline.services().clone()
    };
    run.pipeline = Arc::new(Pipeline::new(
        run.pipeline.config().clone(),
        registry.clone(),
        services,
    ));

    let handle = run
        .pipeline
        .submit(GenerationRequest::new("migraine", "tension", ""))
        .unwrap();
    let id = handle.session_id;
    handle.finished().await;

    // Evicted from the registry, but the job still ran to completion.
    assert!(registry.get(id).is_none());
    let record_path = run.archive().join(id.to_string()).join("record.json");
    assert!(record_path.exists());
    assert_eq!(run.toolchain.operations(), ["silence 60", "concat 5", "mix"]);
    assert!(!run.workspace(id).exists());
}

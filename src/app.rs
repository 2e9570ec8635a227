//! Composition root.
//!
//! Builds the pipeline collaborators from [`Config`] and runs the
//! long-lived server or a one-shot local generation.

use crate::audio::{AudioToolchain, FfmpegToolchain, HealthStatus, ToolStatus};
use crate::config::{Config, StorageBackend};
use crate::defaults;
use crate::error::{MindtrackError, Result};
use crate::pipeline::{GenerationRequest, JobStep, Pipeline, PipelineConfig, PipelineServices};
use crate::script::OpenAiScriptGenerator;
use crate::server::{AppState, create_router};
use crate::session::{SessionRegistry, SessionStatus, spawn_sweeper};
use crate::settings::{InMemorySettingsStore, Settings, SettingsStore, SupabaseSettingsStore};
use crate::speech::ElevenLabsSynthesizer;
use crate::storage::{ArtifactStore, LocalArtifactStore, SupabaseArtifactStore};
use crate::supabase::SupabaseClient;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Build the external collaborators selected by `config`.
pub fn build_services(config: &Config) -> Result<PipelineServices> {
    let fallback = Settings::from_env();

    let (settings, store): (Arc<dyn SettingsStore>, Arc<dyn ArtifactStore>) =
        match config.storage.backend {
            StorageBackend::Supabase => {
                let client = supabase_client(config)?;
                (
                    Arc::new(SupabaseSettingsStore::new(
                        client.clone(),
                        &config.storage.settings_table,
                        fallback,
                    )),
                    Arc::new(SupabaseArtifactStore::new(
                        client,
                        &config.storage.bucket,
                        &config.storage.records_table,
                    )),
                )
            }
            StorageBackend::Local => (
                Arc::new(InMemorySettingsStore::new(fallback)),
                Arc::new(LocalArtifactStore::new(config.paths.archive_dir.clone())),
            ),
        };

    Ok(PipelineServices {
        settings,
        generator: Arc::new(OpenAiScriptGenerator::new(&config.providers.openai_base_url)),
        synthesizer: Arc::new(ElevenLabsSynthesizer::new(
            &config.providers.elevenlabs_base_url,
        )),
        toolchain: Arc::new(FfmpegToolchain::system(config.timeouts.tool)),
        store,
    })
}

fn supabase_client(config: &Config) -> Result<SupabaseClient> {
    match (&config.storage.supabase_url, &config.storage.supabase_key) {
        (Some(url), Some(key)) => Ok(SupabaseClient::new(url, key)),
        _ => Err(MindtrackError::ConfigInvalidValue {
            key: "storage".to_string(),
            message: "supabase backend needs supabase_url and supabase_key".to_string(),
        }),
    }
}

/// Pipeline with a fresh session registry.
pub fn build_pipeline(config: &Config) -> Result<Arc<Pipeline>> {
    let services = build_services(config)?;
    Ok(Arc::new(Pipeline::new(
        PipelineConfig::from_config(config),
        SessionRegistry::new(),
        services,
    )))
}

/// Serve the HTTP API until SIGINT/SIGTERM.
pub async fn run_server(config: Config) -> Result<()> {
    let pipeline = build_pipeline(&config)?;

    if !config.paths.music_path.exists() {
        tracing::warn!(
            path = %config.paths.music_path.display(),
            "background music is missing, every job will fail at the overlay step"
        );
    }

    let sweeper = spawn_sweeper(
        pipeline.registry().clone(),
        config.sessions.sweep_interval,
        config.sessions.retention,
        config.paths.workspace_root.clone(),
    );

    let app = create_router(AppState::new(Arc::clone(&pipeline), &config));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        address = %addr,
        version = %crate::version_string(),
        storage = ?config.storage.backend,
        workspace = %config.paths.workspace_root.display(),
        "mindtrack listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    tracing::info!(active_sessions = pipeline.registry().len(), "server stopped");
    served.map_err(MindtrackError::from)
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "failed to set up signal handler");
            }
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

/// Wait for SIGTERM signal (sent by container runtimes and systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| MindtrackError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}

/// Run one job in-process, showing progress from the session registry.
///
/// Returns the stored audio location.
pub async fn run_generate(
    config: &Config,
    request: GenerationRequest,
    output: Option<&Path>,
    quiet: bool,
) -> Result<String> {
    let pipeline = build_pipeline(config)?;
    let handle = pipeline.submit(request)?;
    let id = handle.session_id;

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner
    };

    let mut finished = std::pin::pin!(handle.finished());
    loop {
        tokio::select! {
            _ = &mut finished => break,
            _ = tokio::time::sleep(PROGRESS_POLL_INTERVAL) => {
                if let Some(session) = pipeline.registry().get(id) {
                    let label = JobStep::from_number(session.current_step)
                        .map_or("Working", JobStep::label);
                    spinner.set_message(format!(
                        "[{}/{}] {label}",
                        session.current_step,
                        defaults::FINAL_STEP
                    ));
                }
                spinner.tick();
            }
        }
    }
    spinner.finish_and_clear();

    let session = pipeline
        .registry()
        .get(id)
        .ok_or_else(|| MindtrackError::SessionNotFound { id: id.to_string() })?;

    match session.status {
        SessionStatus::Completed => {
            let location = session.audio_location.unwrap_or_default();
            if let Some(output) = output {
                export_local(&location, output).await?;
            }
            Ok(location)
        }
        _ => Err(MindtrackError::Other(
            session
                .error_message
                .unwrap_or_else(|| defaults::GENERIC_FAILURE.to_string()),
        )),
    }
}

async fn export_local(location: &str, output: &Path) -> Result<()> {
    if location.starts_with("http://") || location.starts_with("https://") {
        tracing::warn!(location, "audio was stored remotely, not copying to --output");
        return Ok(());
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(PathBuf::from(location), output).await?;
    Ok(())
}

/// Print a toolchain report. Returns true when everything needed is present.
pub async fn run_check(config: &Config) -> bool {
    let toolchain = FfmpegToolchain::system(defaults::HEALTH_CHECK_TIMEOUT);
    let health = toolchain.health().await;

    println!("Checking audio toolchain...\n");
    print_tool("ffmpeg", &health.ffmpeg);
    print_tool("ffprobe", &health.ffprobe);

    let music_ok = config.paths.music_path.exists();
    if music_ok {
        println!(
            "  {} background music ({})",
            "✓".green(),
            config.paths.music_path.display()
        );
    } else {
        println!(
            "  {} background music not found at {}",
            "✗".red(),
            config.paths.music_path.display()
        );
    }

    println!();
    match health.status {
        HealthStatus::Healthy => println!("{}", health.message.green()),
        HealthStatus::Partial => println!("{}", health.message.yellow()),
        HealthStatus::Error => println!("{}", health.message.red()),
    }

    health.is_healthy() && music_ok
}

fn print_tool(name: &str, status: &ToolStatus) {
    if status.installed {
        println!(
            "  {} {name} {}",
            "✓".green(),
            status.version.as_deref().unwrap_or("(unknown version)")
        );
    } else {
        println!(
            "  {} {name}: {}",
            "✗".red(),
            status.error.as_deref().unwrap_or("not found")
        );
    }
}

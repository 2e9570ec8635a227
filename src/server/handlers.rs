use super::error::ApiError;
use super::state::AppState;
use crate::audio::{HealthStatus, ToolchainHealth};
use crate::pipeline::GenerationRequest;
use crate::session::{SessionId, SessionStatus};
use crate::settings::{Settings, SettingsUpdate};
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const AUDIO_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub session_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub current_step: u32,
    pub audio_path: Option<String>,
    pub error: Option<String>,
}

/// Flat diagnostics shape expected by the frontend.
#[derive(Debug, Serialize)]
pub struct ToolchainStatusResponse {
    pub ffmpeg_installed: bool,
    pub ffmpeg_version: Option<String>,
    pub ffprobe_installed: bool,
    pub ffprobe_version: Option<String>,
    pub status: HealthStatus,
    pub message: String,
}

impl From<ToolchainHealth> for ToolchainStatusResponse {
    fn from(health: ToolchainHealth) -> Self {
        Self {
            ffmpeg_installed: health.ffmpeg.installed,
            ffmpeg_version: health.ffmpeg.version,
            ffprobe_installed: health.ffprobe.installed,
            ffprobe_version: health.ffprobe.version,
            status: health.status,
            message: health.message,
        }
    }
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Meditation API is running",
        "version": crate::version_string(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.password != state.auth.app_password {
        return Err(ApiError::unauthorized("Invalid password"));
    }
    Ok(Json(AuthResponse { success: true }))
}

pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let handle = state.pipeline.submit(req)?;
    Ok(Json(GenerateResponse {
        session_id: handle.session_id.to_string(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = required_session_id(&query)?;
    let session = id
        .and_then(|id| state.pipeline.registry().get(id))
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    Ok(Json(StatusResponse {
        status: session.status,
        current_step: session.current_step,
        audio_path: session.audio_location,
        error: session.error_message,
    }))
}

/// Redirect to a durable URL, or stream a locally kept artifact.
pub async fn audio(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let id = required_session_id(&query)?;
    let location = id
        .and_then(|id| state.pipeline.registry().get(id))
        .filter(|session| session.status == SessionStatus::Completed)
        .and_then(|session| session.audio_location)
        .ok_or_else(|| ApiError::not_found("Audio not ready or session not found"))?;

    if location.starts_with("http://") || location.starts_with("https://") {
        let target = HeaderValue::from_str(&location)
            .map_err(|_| ApiError::internal("Invalid audio location"))?;
        return Ok((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, target)]).into_response());
    }

    let bytes = match tokio::fs::read(&location).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Audio file not found"));
        }
        Err(e) => {
            tracing::error!(path = %location, error = %e, "failed to read audio");
            return Err(ApiError::internal("Failed to read audio file"));
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, AUDIO_CACHE_CONTROL),
        ],
        Body::from(bytes),
    )
        .into_response())
}

pub async fn toolchain_status(State(state): State<AppState>) -> Json<ToolchainStatusResponse> {
    let health = state.pipeline.services().toolchain.health().await;
    Json(health.into())
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    let settings = state.pipeline.services().settings.fetch().await?;
    Ok(Json(settings))
}

/// Apply only the provided fields.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiError> {
    let store = &state.pipeline.services().settings;
    let settings = if update.is_empty() {
        store.fetch().await?
    } else {
        store.update(&update).await?
    };
    tracing::info!(empty = update.is_empty(), "admin settings updated");
    Ok(Json(settings))
}

/// `Ok(None)` for an id that is present but cannot name any session.
fn required_session_id(query: &SessionQuery) -> Result<Option<SessionId>, ApiError> {
    let raw = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Session ID is required"))?;
    Ok(raw.parse().ok())
}

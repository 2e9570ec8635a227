//! Shared-secret request guards.

use super::error::ApiError;
use super::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

pub const APP_PASSWORD_HEADER: &str = "x-app-password";
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Require the end-user password on job routes when enforcement is enabled.
pub async fn require_app_password(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.auth.enforce_app_password
        && header_value(request.headers(), APP_PASSWORD_HEADER) != Some(state.auth.app_password.as_str())
    {
        return Err(ApiError::unauthorized("Invalid password"));
    }
    Ok(next.run(request).await)
}

/// Require the admin password. Without a configured one the admin API is off.
pub async fn require_admin_password(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.auth.admin_password.as_deref() else {
        return Err(ApiError::forbidden("Admin API is disabled"));
    };

    if header_value(request.headers(), ADMIN_PASSWORD_HEADER) != Some(expected) {
        tracing::warn!(uri = %request.uri(), "rejected admin request");
        return Err(ApiError::unauthorized("Invalid admin password"));
    }
    Ok(next.run(request).await)
}

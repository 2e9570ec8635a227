//! HTTP API in front of the pipeline and session registry.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

pub use error::ApiError;
pub use state::AppState;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    let job_routes = Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/status", get(handlers::status))
        .route("/api/audio", get(handlers::audio))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_app_password,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/admin/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_password,
        ));

    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/auth", post(handlers::login))
        .route("/api/ffmpeg-status", get(handlers::toolchain_status))
        .merge(job_routes)
        .merge(admin_routes)
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Credentialed CORS needs explicit origins, methods and headers.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::APP_PASSWORD_HEADER),
            HeaderName::from_static(auth::ADMIN_PASSWORD_HEADER),
        ])
        .allow_credentials(true)
}

//! Shared handler state.

use crate::config::{AuthConfig, Config};
use crate::pipeline::Pipeline;
use std::sync::Arc;

/// State cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub auth: Arc<AuthConfig>,
    /// Browser origins allowed by the CORS layer.
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            auth: Arc::new(config.auth.clone()),
            allowed_origins: config.server.allowed_origins.clone().into(),
        }
    }
}

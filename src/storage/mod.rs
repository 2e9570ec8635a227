//! Durable storage for finished meditations.

pub mod local;
pub mod supabase;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use local::LocalArtifactStore;
pub use supabase::SupabaseArtifactStore;

/// Metadata saved alongside every finished meditation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeditationRecord {
    pub id: String,
    pub disease: String,
    pub symptom: String,
    pub additional_instructions: String,
    pub meditation_text: String,
    pub chapter_count: usize,
    pub duration_seconds: f64,
    /// Filled in by the store once the audio is uploaded.
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Artifact store gateway.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the audio file and its record; returns a durable reference to the audio.
    async fn persist(&self, record: &MeditationRecord, audio: &Path) -> Result<String>;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn persist(&self, record: &MeditationRecord, audio: &Path) -> Result<String> {
        (**self).persist(record, audio).await
    }
}

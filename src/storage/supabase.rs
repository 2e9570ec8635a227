//! Supabase storage bucket plus records table.

use super::{ArtifactStore, MeditationRecord};
use crate::error::{MindtrackError, Result};
use crate::supabase::{SupabaseClient, json_rows};
use async_trait::async_trait;
use std::path::Path;

pub struct SupabaseArtifactStore {
    client: SupabaseClient,
    bucket: String,
    table: String,
}

impl SupabaseArtifactStore {
    pub fn new(client: SupabaseClient, bucket: &str, table: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            table: table.to_string(),
        }
    }

    async fn upload(&self, object: &str, audio: &Path) -> std::result::Result<String, String> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| format!("could not read {}: {e}", audio.display()))?;

        let response = self
            .client
            .post(&self.client.object_url(&self.bucket, object))
            .header(reqwest::header::CONTENT_TYPE, "audio/mpeg")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| format!("upload failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("upload returned {}: {}", status.as_u16(), detail.trim()));
        }

        Ok(self.client.public_url(&self.bucket, object))
    }

    async fn insert(&self, record: &MeditationRecord) -> std::result::Result<(), String> {
        let response = self
            .client
            .post(&self.client.rest_url(&self.table, ""))
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(|e| format!("insert failed: {e}"))?;

        json_rows(response).await.map(|_| ())
    }
}

#[async_trait]
impl ArtifactStore for SupabaseArtifactStore {
    async fn persist(&self, record: &MeditationRecord, audio: &Path) -> Result<String> {
        let persistence_error = |message: String| MindtrackError::Persistence { message };

        let object = format!("{}.mp3", record.id);
        let url = self.upload(&object, audio).await.map_err(persistence_error)?;

        let stored = MeditationRecord {
            audio_url: Some(url.clone()),
            ..record.clone()
        };
        self.insert(&stored).await.map_err(persistence_error)?;

        tracing::info!(session_id = %record.id, url = %url, "meditation uploaded");
        Ok(url)
    }
}

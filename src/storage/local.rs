//! Filesystem archive, used when no remote storage is configured.

use super::{ArtifactStore, MeditationRecord};
use crate::error::{MindtrackError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Archives each meditation as `<root>/<id>/meditation.mp3` plus `record.json`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write(&self, record: &MeditationRecord, audio: &Path) -> std::io::Result<PathBuf> {
        let dir = self.root.join(&record.id);
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join("meditation.mp3");
        tokio::fs::copy(audio, &target).await?;
        let target = std::path::absolute(&target)?;

        let stored = MeditationRecord {
            audio_url: Some(target.to_string_lossy().into_owned()),
            ..record.clone()
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(std::io::Error::other)?;
        tokio::fs::write(dir.join("record.json"), json).await?;

        Ok(target)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn persist(&self, record: &MeditationRecord, audio: &Path) -> Result<String> {
        let target = self
            .write(record, audio)
            .await
            .map_err(|e| MindtrackError::Persistence {
                message: format!("could not archive to {}: {e}", self.root.display()),
            })?;

        tracing::info!(session_id = %record.id, path = %target.display(), "meditation archived");
        Ok(target.to_string_lossy().into_owned())
    }
}

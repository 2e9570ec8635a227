//! Per-job scratch directory.

use crate::error::Result;
use crate::session::SessionId;
use std::path::{Path, PathBuf};

/// Directory holding one job's intermediate audio, named after its session.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Where the workspace for `id` lives under `root`.
    pub fn dir_for(root: &Path, id: SessionId) -> PathBuf {
        root.join(id.to_string())
    }

    /// Create the workspace directory (and `root` if needed).
    pub async fn create(root: &Path, id: SessionId) -> Result<Self> {
        let dir = Self::dir_for(root, id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `chapter{n}.mp3`, numbered from 1.
    pub fn chapter_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("chapter{}.mp3", index + 1))
    }

    pub fn silence_path(&self) -> PathBuf {
        self.dir.join("silence.mp3")
    }

    pub fn combined_path(&self) -> PathBuf {
        self.dir.join("combined.mp3")
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join("final.mp3")
    }

    /// Delete individual files, logging failures instead of returning them.
    pub async fn remove_files(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove intermediate file")
                }
            }
        }
    }

    /// Delete the whole directory, logging failures instead of returning them.
    pub async fn remove_all(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => tracing::debug!(path = %self.dir.display(), "workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.dir.display(), error = %e, "failed to remove workspace")
            }
        }
    }
}

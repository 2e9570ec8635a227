//! Periodic eviction of expired sessions.

use super::SessionRegistry;
use crate::clock::Clock;
use crate::pipeline::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Evict expired sessions and delete whatever is left of finished jobs'
/// workspaces.
///
/// A job still running keeps its directory and removes it itself when it
/// ends. Returns the number of evicted sessions. Directory removal is
/// best-effort.
pub async fn sweep_once<C: Clock>(
    registry: &SessionRegistry<C>,
    retention: Duration,
    workspace_root: &Path,
) -> usize {
    let evicted = registry.sweep(retention);

    for (id, session) in &evicted {
        if !session.status.is_terminal() {
            tracing::debug!(session_id = %id, "evicted a running job, leaving its workspace");
            continue;
        }
        let dir = Workspace::dir_for(workspace_root, *id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(session_id = %id, path = %dir.display(), "removed stale workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(session_id = %id, path = %dir.display(), error = %e, "failed to remove stale workspace")
            }
        }
    }

    if !evicted.is_empty() {
        tracing::info!(count = evicted.len(), remaining = registry.len(), "evicted expired sessions");
    }
    evicted.len()
}

/// Run [`sweep_once`] every `interval` for the life of the returned task.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_sweeper<C: Clock + 'static>(
    registry: SessionRegistry<C>,
    interval: Duration,
    retention: Duration,
    workspace_root: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&registry, retention, &workspace_root).await;
        }
    })
}

//! Job sessions: observable progress and result of each generation job.

pub mod registry;
pub mod sweeper;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

pub use registry::SessionRegistry;
pub use sweeper::{spawn_sweeper, sweep_once};

/// Lifecycle of a session. Leaves `Processing` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Processing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque job identifier, unique per submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub status: SessionStatus,
    pub current_step: u32,
    /// Only used for eviction.
    pub created_at: Instant,
    pub audio_location: Option<String>,
    pub error_message: Option<String>,
}

impl Session {
    pub fn new(created_at: Instant) -> Self {
        Self {
            status: SessionStatus::Processing,
            current_step: 0,
            created_at,
            audio_location: None,
            error_message: None,
        }
    }
}

/// Partial session change. Unset fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub current_step: Option<u32>,
    pub audio_location: Option<String>,
    pub error_message: Option<String>,
}

impl SessionUpdate {
    /// Advance the progress counter.
    pub fn step(step: u32) -> Self {
        Self {
            current_step: Some(step),
            ..Self::default()
        }
    }

    /// Finish successfully at `step` with the artifact reference.
    pub fn completed(step: u32, audio_location: impl Into<String>) -> Self {
        Self {
            status: Some(SessionStatus::Completed),
            current_step: Some(step),
            audio_location: Some(audio_location.into()),
            error_message: None,
        }
    }

    /// Finish with an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(SessionStatus::Error),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(SessionStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_session_ids_are_unique_and_parse_back() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);

        let parsed: SessionId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_new_session_is_processing_at_step_zero() {
        let session = Session::new(Instant::now());
        assert_eq!(session.status, SessionStatus::Processing);
        assert_eq!(session.current_step, 0);
        assert!(session.audio_location.is_none());
        assert!(session.error_message.is_none());
    }

    #[test]
    fn test_update_builders() {
        assert_eq!(SessionUpdate::step(2).current_step, Some(2));

        let done = SessionUpdate::completed(4, "https://x/a.mp3");
        assert_eq!(done.status, Some(SessionStatus::Completed));
        assert_eq!(done.audio_location.as_deref(), Some("https://x/a.mp3"));

        let failed = SessionUpdate::failed("boom");
        assert_eq!(failed.status, Some(SessionStatus::Error));
        assert_eq!(failed.current_step, None);
    }
}

//! In-process session registry.
//!
//! One coarse lock guards the whole map. Every operation holds it only for
//! the in-memory mutation; nothing performs I/O under the lock.

use super::{Session, SessionId, SessionStatus, SessionUpdate};
use crate::clock::{Clock, SystemClock};
use crate::error::{MindtrackError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct Inner<C> {
    sessions: Mutex<HashMap<SessionId, Session>>,
    clock: C,
}

/// Shared handle to the session map. Clones refer to the same registry.
pub struct SessionRegistry<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for SessionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SessionRegistry<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SessionRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SessionRegistry<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                clock,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new `Processing` session at step 0.
    ///
    /// Fails with `SessionExists` if the id is already registered.
    pub fn create(&self, id: SessionId) -> Result<Session> {
        let session = Session::new(self.inner.clock.now());
        let mut sessions = self.lock();
        if sessions.contains_key(&id) {
            return Err(MindtrackError::SessionExists { id: id.to_string() });
        }
        sessions.insert(id, session.clone());
        Ok(session)
    }

    /// Apply a partial update and return the resulting session.
    ///
    /// Terminal sessions are immutable (`SessionFinished`). A step lower than
    /// the current one is ignored. The audio location is only taken together
    /// with a transition to `Completed`, the error message only with a
    /// transition to `Error`.
    pub fn update(&self, id: SessionId, update: SessionUpdate) -> Result<Session> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| MindtrackError::SessionNotFound { id: id.to_string() })?;

        if session.status.is_terminal() {
            return Err(MindtrackError::SessionFinished { id: id.to_string() });
        }

        if let Some(step) = update.current_step {
            if step >= session.current_step {
                session.current_step = step;
            } else {
                tracing::debug!(
                    session_id = %id,
                    current = session.current_step,
                    requested = step,
                    "ignoring step regression"
                );
            }
        }

        match update.status {
            Some(SessionStatus::Completed) => {
                session.status = SessionStatus::Completed;
                session.audio_location = update.audio_location;
            }
            Some(SessionStatus::Error) => {
                session.status = SessionStatus::Error;
                session.error_message = update.error_message;
            }
            Some(SessionStatus::Processing) | None => {}
        }

        Ok(session.clone())
    }

    /// Point lookup.
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.lock().get(&id).cloned()
    }

    /// Remove a session, returning it if it existed.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        self.lock().remove(&id)
    }

    /// Evict every session created more than `retention` ago, whatever its
    /// status, and return the evicted entries.
    pub fn sweep(&self, retention: Duration) -> Vec<(SessionId, Session)> {
        let now = self.inner.clock.now();
        let mut sessions = self.lock();

        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| now.saturating_duration_since(session.created_at) > retention)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|session| (id, session)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> (SessionRegistry<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (SessionRegistry::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();

        registry.create(id).unwrap();
        let session = registry.get(id).unwrap();

        assert_eq!(session.status, SessionStatus::Processing);
        assert_eq!(session.current_step, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_twice_fails() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        let err = registry.create(id).unwrap_err();
        assert!(matches!(err, MindtrackError::SessionExists { .. }));
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get(SessionId::new()).is_none());
    }

    #[test]
    fn test_update_unknown_fails() {
        let registry = SessionRegistry::new();
        let err = registry
            .update(SessionId::new(), SessionUpdate::step(1))
            .unwrap_err();
        assert!(matches!(err, MindtrackError::SessionNotFound { .. }));
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        let session = registry.update(id, SessionUpdate::step(2)).unwrap();
        assert_eq!(session.current_step, 2);
        assert_eq!(session.status, SessionStatus::Processing);
        assert!(session.audio_location.is_none());
    }

    #[test]
    fn test_step_never_decreases() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        registry.update(id, SessionUpdate::step(3)).unwrap();
        let session = registry.update(id, SessionUpdate::step(1)).unwrap();
        assert_eq!(session.current_step, 3);
    }

    #[test]
    fn test_step_sequence_is_monotone() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        let mut last = 0;
        for step in [0, 1, 1, 0, 2, 4, 3, 2, 4] {
            let session = registry.update(id, SessionUpdate::step(step)).unwrap();
            assert!(session.current_step >= last);
            last = session.current_step;
        }
        assert_eq!(last, 4);
    }

    #[test]
    fn test_completion_sets_location_once() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        let session = registry
            .update(id, SessionUpdate::completed(4, "https://cdn/a.mp3"))
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.current_step, 4);
        assert_eq!(session.audio_location.as_deref(), Some("https://cdn/a.mp3"));
        assert!(session.error_message.is_none());
    }

    #[test]
    fn test_terminal_sessions_are_immutable() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();
        registry.update(id, SessionUpdate::failed("boom")).unwrap();

        for update in [
            SessionUpdate::step(3),
            SessionUpdate::completed(4, "late.mp3"),
            SessionUpdate::failed("again"),
        ] {
            let err = registry.update(id, update).unwrap_err();
            assert!(matches!(err, MindtrackError::SessionFinished { .. }));
        }

        let session = registry.get(id).unwrap();
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.error_message.as_deref(), Some("boom"));
        assert!(session.audio_location.is_none());
    }

    #[test]
    fn test_location_ignored_without_completion() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        let session = registry
            .update(
                id,
                SessionUpdate {
                    current_step: Some(1),
                    audio_location: Some("early.mp3".to_string()),
                    error_message: Some("not yet".to_string()),
                    status: None,
                },
            )
            .unwrap();

        assert!(session.audio_location.is_none());
        assert!(session.error_message.is_none());
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        registry.create(id).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_evicts_only_old_sessions_regardless_of_status() {
        let (registry, clock) = registry();
        let retention = Duration::from_secs(3600);

        let old_processing = SessionId::new();
        let old_completed = SessionId::new();
        let old_failed = SessionId::new();
        registry.create(old_processing).unwrap();
        registry.create(old_completed).unwrap();
        registry.create(old_failed).unwrap();
        registry
            .update(old_completed, SessionUpdate::completed(4, "a.mp3"))
            .unwrap();
        registry
            .update(old_failed, SessionUpdate::failed("x"))
            .unwrap();

        clock.advance(Duration::from_secs(1800));
        let fresh = SessionId::new();
        registry.create(fresh).unwrap();

        clock.advance(Duration::from_secs(1801));
        let mut evicted: Vec<SessionId> =
            registry.sweep(retention).into_iter().map(|(id, _)| id).collect();
        evicted.sort_by_key(|id| id.to_string());
        let mut expected = vec![old_processing, old_completed, old_failed];
        expected.sort_by_key(|id| id.to_string());

        assert_eq!(evicted, expected);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(fresh).is_some());
    }

    #[test]
    fn test_sweep_keeps_session_exactly_at_retention() {
        let (registry, clock) = registry();
        let id = SessionId::new();
        registry.create(id).unwrap();

        clock.advance(Duration::from_secs(3600));
        assert!(registry.sweep(Duration::from_secs(3600)).is_empty());

        clock.advance(Duration::from_secs(1));
        let evicted = registry.sweep(Duration::from_secs(3600));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, id);
        assert_eq!(evicted[0].1.status, SessionStatus::Processing);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let other = registry.clone();
        let id = SessionId::new();

        registry.create(id).unwrap();
        other.update(id, SessionUpdate::step(1)).unwrap();

        assert_eq!(registry.get(id).unwrap().current_step, 1);
    }

    #[test]
    fn test_concurrent_updates_from_threads() {
        let registry = SessionRegistry::new();
        let ids: Vec<SessionId> = (0..8).map(|_| SessionId::new()).collect();
        for id in &ids {
            registry.create(*id).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for step in 0..=4 {
                        registry.update(id, SessionUpdate::step(step)).unwrap();
                    }
                    registry
                        .update(id, SessionUpdate::completed(4, id.to_string()))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            let session = registry.get(id).unwrap();
            assert_eq!(session.status, SessionStatus::Completed);
            assert_eq!(session.audio_location, Some(id.to_string()));
        }
    }
}

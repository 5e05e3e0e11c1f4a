use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, SessionKey};
use crate::model::lesson::LessonType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("a watch session is already open for lesson {0}")]
    SessionAlreadyOpen(LessonId),

    #[error("{lesson_type} lessons do not open watch sessions")]
    NoSessionForType { lesson_type: LessonType },
}

/// Persisted progress for a lesson as reported by the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    #[serde(default)]
    pub watched_seconds: u32,
    #[serde(default)]
    pub is_completed: bool,
}

/// Per-lesson progress while a lesson view is mounted.
///
/// `is_completed` only ever moves from false to true, and a session key is
/// present exactly while a watch session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgressState {
    lesson_id: LessonId,
    lesson_type: LessonType,
    duration_seconds: u32,
    watched_seconds: u32,
    is_completed: bool,
    session_key: Option<SessionKey>,
}

impl LessonProgressState {
    #[must_use]
    pub fn new(
        lesson_id: LessonId,
        lesson_type: LessonType,
        duration_seconds: u32,
        already_completed: bool,
    ) -> Self {
        Self {
            lesson_id,
            lesson_type,
            duration_seconds,
            watched_seconds: 0,
            is_completed: already_completed,
            session_key: None,
        }
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn lesson_type(&self) -> LessonType {
        self.lesson_type
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn watched_seconds(&self) -> u32 {
        self.watched_seconds
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    #[must_use]
    pub fn has_open_session(&self) -> bool {
        self.session_key.is_some()
    }

    /// Playback position to resume from, clamped to the lesson duration.
    ///
    /// A zero duration means the length is unknown and no clamping applies.
    #[must_use]
    pub fn resume_position(&self) -> u32 {
        if self.duration_seconds == 0 {
            self.watched_seconds
        } else {
            self.watched_seconds.min(self.duration_seconds)
        }
    }

    /// Flip the completion flag.
    ///
    /// Returns `true` only for the call that performed the transition, so the
    /// caller can raise exactly one completion signal.
    pub fn mark_completed(&mut self) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        true
    }

    /// Record the authoritative watched duration.
    pub fn record_watched(&mut self, watched_seconds: u32) {
        self.watched_seconds = watched_seconds;
    }

    /// Apply a progress snapshot fetched from the authority.
    ///
    /// Returns `true` when the snapshot newly completed the lesson.
    pub fn apply_remote(&mut self, progress: LessonProgress) -> bool {
        self.record_watched(progress.watched_seconds);
        progress.is_completed && self.mark_completed()
    }

    /// Store the key of a freshly opened watch session.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::SessionAlreadyOpen` if a key is already held and
    /// `ProgressError::NoSessionForType` for lesson types without sessions.
    pub fn open_session(&mut self, key: SessionKey) -> Result<(), ProgressError> {
        if self.lesson_type != LessonType::Video {
            return Err(ProgressError::NoSessionForType {
                lesson_type: self.lesson_type,
            });
        }
        if self.session_key.is_some() {
            return Err(ProgressError::SessionAlreadyOpen(self.lesson_id));
        }
        self.session_key = Some(key);
        Ok(())
    }

    /// Forget the open session, returning its key if there was one.
    pub fn close_session(&mut self) -> Option<SessionKey> {
        self.session_key.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> LessonProgressState {
        LessonProgressState::new(LessonId::new(1), LessonType::Video, 600, false)
    }

    #[test]
    fn completion_flips_once() {
        let mut state = video();
        assert!(state.mark_completed());
        assert!(!state.mark_completed());
        assert!(state.is_completed());
    }

    #[test]
    fn already_completed_never_signals() {
        let mut state = LessonProgressState::new(LessonId::new(1), LessonType::Reading, 0, true);
        assert!(!state.mark_completed());
        assert!(!state.apply_remote(LessonProgress {
            watched_seconds: 0,
            is_completed: true,
        }));
    }

    #[test]
    fn remote_incomplete_snapshot_does_not_reset_completion() {
        let mut state = video();
        state.mark_completed();
        state.apply_remote(LessonProgress {
            watched_seconds: 12,
            is_completed: false,
        });
        assert!(state.is_completed());
        assert_eq!(state.watched_seconds(), 12);
    }

    #[test]
    fn only_one_session_at_a_time() {
        let mut state = video();
        state.open_session(SessionKey::new("a")).unwrap();
        let err = state.open_session(SessionKey::new("b")).unwrap_err();
        assert_eq!(err, ProgressError::SessionAlreadyOpen(LessonId::new(1)));
        assert_eq!(state.close_session(), Some(SessionKey::new("a")));
        assert!(!state.has_open_session());
        assert_eq!(state.close_session(), None);
    }

    #[test]
    fn reading_lessons_have_no_sessions() {
        let mut state = LessonProgressState::new(LessonId::new(2), LessonType::Reading, 0, false);
        assert!(matches!(
            state.open_session(SessionKey::new("x")),
            Err(ProgressError::NoSessionForType { .. })
        ));
    }

    #[test]
    fn resume_position_is_clamped_to_duration() {
        let mut state = video();
        state.record_watched(900);
        assert_eq!(state.resume_position(), 600);

        let mut unknown = LessonProgressState::new(LessonId::new(3), LessonType::Video, 0, false);
        unknown.record_watched(900);
        assert_eq!(unknown.resume_position(), 900);
    }
}

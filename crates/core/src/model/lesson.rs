use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{LessonId, SectionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LessonError {
    #[error("unknown lesson type: {0}")]
    UnknownType(String),
}

//
// ─── LESSON TYPE ──────────────────────────────────────────────────────────────
//

/// Kind of content a lesson presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonType {
    Video,
    Reading,
    Quiz,
    Coding,
}

/// How completion is detected for a lesson type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPolicy {
    /// Remote watch session with periodic heartbeats.
    WatchSession,
    /// Local dwell timer followed by a persisted update.
    DwellTimer,
    /// Timed quiz attempt graded by the authority.
    Attempt,
    /// Code submission graded by the authority.
    CodeSubmission,
}

impl LessonType {
    #[must_use]
    pub fn tracking(self) -> TrackingPolicy {
        match self {
            LessonType::Video => TrackingPolicy::WatchSession,
            LessonType::Reading => TrackingPolicy::DwellTimer,
            LessonType::Quiz => TrackingPolicy::Attempt,
            LessonType::Coding => TrackingPolicy::CodeSubmission,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Video => "VIDEO",
            LessonType::Reading => "READING",
            LessonType::Quiz => "QUIZ",
            LessonType::Coding => "CODING",
        }
    }
}

impl fmt::Display for LessonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonType {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIDEO" => Ok(Self::Video),
            "READING" => Ok(Self::Reading),
            "QUIZ" => Ok(Self::Quiz),
            "CODING" => Ok(Self::Coding),
            _ => Err(LessonError::UnknownType(s.to_owned())),
        }
    }
}

//
// ─── LESSON REF ───────────────────────────────────────────────────────────────
//

/// Navigation-level reference to a lesson within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRef {
    pub id: LessonId,
    pub section_id: SectionId,
    pub title: String,
    pub lesson_type: LessonType,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub duration_seconds: u32,
}

impl LessonRef {
    #[must_use]
    pub fn new(
        id: LessonId,
        section_id: SectionId,
        title: impl Into<String>,
        lesson_type: LessonType,
    ) -> Self {
        Self {
            id,
            section_id,
            title: title.into(),
            lesson_type,
            is_preview: false,
            duration_seconds: 0,
        }
    }

    #[must_use]
    pub fn with_preview(mut self, is_preview: bool) -> Self {
        self.is_preview = is_preview;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration_seconds: u32) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }
}

/// A course section holding lessons in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub lessons: Vec<LessonRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_type_parses_case_insensitively() {
        assert_eq!("video".parse::<LessonType>().unwrap(), LessonType::Video);
        assert_eq!("CODING".parse::<LessonType>().unwrap(), LessonType::Coding);
        assert!(matches!(
            "podcast".parse::<LessonType>(),
            Err(LessonError::UnknownType(_))
        ));
    }

    #[test]
    fn tracking_policy_per_type() {
        assert_eq!(LessonType::Video.tracking(), TrackingPolicy::WatchSession);
        assert_eq!(LessonType::Reading.tracking(), TrackingPolicy::DwellTimer);
        assert_eq!(LessonType::Quiz.tracking(), TrackingPolicy::Attempt);
        assert_eq!(LessonType::Coding.tracking(), TrackingPolicy::CodeSubmission);
    }

    #[test]
    fn lesson_ref_builders() {
        let lesson = LessonRef::new(LessonId::new(1), SectionId::new(1), "Intro", LessonType::Video)
            .with_preview(true)
            .with_duration(600);
        assert!(lesson.is_preview);
        assert_eq!(lesson.duration_seconds, 600);
    }
}

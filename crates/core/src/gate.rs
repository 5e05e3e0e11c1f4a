use std::collections::HashSet;

use crate::model::{LessonId, LessonRef, Section};

//
// ─── VIEWER ────────────────────────────────────────────────────────────────────
//

/// Relationship between the learner and the course being navigated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// The learner owns the course; lessons unlock sequentially.
    Owner,
    /// The learner does not own the course; only preview lessons open.
    Guest,
}

impl Viewer {
    #[must_use]
    pub fn from_ownership(is_owner: bool) -> Self {
        if is_owner { Viewer::Owner } else { Viewer::Guest }
    }
}

//
// ─── COURSE NAVIGATION ─────────────────────────────────────────────────────────
//

/// Ordered lessons of a course plus the learner's completed set.
///
/// Decides which lessons are open, which neighbour to navigate to and the
/// aggregate completion percentage.
///
/// # Examples
///
/// ```
/// # use course_core::gate::{CourseNav, Viewer};
/// # use course_core::model::{LessonId, LessonRef, LessonType, SectionId};
/// let lesson = |id| LessonRef::new(LessonId::new(id), SectionId::new(1), "L", LessonType::Reading);
/// let mut nav = CourseNav::new(vec![lesson(1), lesson(2), lesson(3)], Viewer::Owner);
/// assert!(nav.is_unlocked(LessonId::new(1)));
/// assert!(!nav.is_unlocked(LessonId::new(2)));
///
/// nav.mark_completed(LessonId::new(1));
/// assert!(nav.is_unlocked(LessonId::new(2)));
/// assert_eq!(nav.progress_percentage(), 33);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseNav {
    lessons: Vec<LessonRef>,
    completed: HashSet<LessonId>,
    viewer: Viewer,
}

impl CourseNav {
    #[must_use]
    pub fn new(lessons: Vec<LessonRef>, viewer: Viewer) -> Self {
        Self {
            lessons,
            completed: HashSet::new(),
            viewer,
        }
    }

    /// Flatten sections into course order.
    #[must_use]
    pub fn from_sections(sections: &[Section], viewer: Viewer) -> Self {
        let lessons = sections
            .iter()
            .flat_map(|section| section.lessons.iter().cloned())
            .collect();
        Self::new(lessons, viewer)
    }

    /// Seed the completed set, ignoring ids that are not part of the course.
    #[must_use]
    pub fn with_completed(mut self, completed: impl IntoIterator<Item = LessonId>) -> Self {
        for id in completed {
            self.mark_completed(id);
        }
        self
    }

    #[must_use]
    pub fn lessons(&self) -> &[LessonRef] {
        &self.lessons
    }

    #[must_use]
    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&LessonRef> {
        self.lessons.iter().find(|lesson| lesson.id == id)
    }

    #[must_use]
    pub fn is_completed(&self, id: LessonId) -> bool {
        self.completed.contains(&id)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Add a lesson to the completed set.
    ///
    /// Returns `false` when the lesson was already completed or does not
    /// belong to this course, so repeated signals are harmless.
    pub fn mark_completed(&mut self, id: LessonId) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.completed.insert(id)
    }

    fn index_of(&self, id: LessonId) -> Option<usize> {
        self.lessons.iter().position(|lesson| lesson.id == id)
    }

    fn is_unlocked_at(&self, index: usize) -> bool {
        let Some(lesson) = self.lessons.get(index) else {
            return false;
        };
        match self.viewer {
            Viewer::Guest => lesson.is_preview,
            Viewer::Owner => match index.checked_sub(1) {
                None => true,
                Some(prev) => self.is_completed(self.lessons[prev].id),
            },
        }
    }

    /// Lessons that are not part of the course are always locked.
    #[must_use]
    pub fn is_unlocked(&self, id: LessonId) -> bool {
        self.index_of(id)
            .is_some_and(|index| self.is_unlocked_at(index))
    }

    #[must_use]
    pub fn is_lesson_locked(&self, lesson: &LessonRef) -> bool {
        !self.is_unlocked(lesson.id)
    }

    /// `round(100 * completed / total)`, 0 for an empty course.
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        let total = self.lessons.len();
        if total == 0 {
            return 0;
        }
        let completed = self.completed.len().min(total);
        let rounded = (200 * completed + total) / (2 * total);
        u8::try_from(rounded).unwrap_or(100)
    }

    /// Nearest unlocked lesson after `current` in course order.
    #[must_use]
    pub fn next_lesson(&self, current: LessonId) -> Option<&LessonRef> {
        let index = self.index_of(current)?;
        (index + 1..self.lessons.len())
            .find(|&i| self.is_unlocked_at(i))
            .map(|i| &self.lessons[i])
    }

    /// Nearest unlocked lesson before `current` in course order.
    #[must_use]
    pub fn previous_lesson(&self, current: LessonId) -> Option<&LessonRef> {
        let index = self.index_of(current)?;
        (0..index)
            .rev()
            .find(|&i| self.is_unlocked_at(i))
            .map(|i| &self.lessons[i])
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

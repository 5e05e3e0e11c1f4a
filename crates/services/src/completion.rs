use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use course_core::gate::CourseNav;
use course_core::model::{LessonId, LessonRef};

/// Completion signal raised by lesson trackers, carrying the lesson id.
///
/// Trackers raise it at most once per attachment; receivers still have to
/// treat repeats as no-ops.
pub type CompletionCallback = Arc<dyn Fn(LessonId) + Send + Sync>;

/// Callback that ignores every signal.
#[must_use]
pub fn ignore_completion() -> CompletionCallback {
    Arc::new(|_| {})
}

/// Shared owner of the learner's completed set and the unlock policy.
///
/// Trackers only write through `completion_callback`; navigation reads
/// through the query methods or a `subscribe`d percentage.
#[derive(Clone)]
pub struct CompletionGate {
    nav: Arc<Mutex<CourseNav>>,
    percentage: Arc<watch::Sender<u8>>,
}

impl CompletionGate {
    #[must_use]
    pub fn new(nav: CourseNav) -> Self {
        let (tx, _rx) = watch::channel(nav.progress_percentage());
        Self {
            nav: Arc::new(Mutex::new(nav)),
            percentage: Arc::new(tx),
        }
    }

    fn nav(&self) -> MutexGuard<'_, CourseNav> {
        self.nav.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn completion_callback(&self) -> CompletionCallback {
        let gate = self.clone();
        Arc::new(move |lesson_id| {
            gate.record_completion(lesson_id);
        })
    }

    /// Mark a lesson completed. Returns `true` only the first time.
    pub fn record_completion(&self, lesson_id: LessonId) -> bool {
        let percentage = {
            let mut nav = self.nav();
            if !nav.mark_completed(lesson_id) {
                tracing::debug!(%lesson_id, "ignoring repeated or foreign completion");
                return false;
            }
            nav.progress_percentage()
        };
        tracing::info!(%lesson_id, percentage, "lesson completed");
        self.percentage.send_replace(percentage);
        true
    }

    #[must_use]
    pub fn is_completed(&self, lesson_id: LessonId) -> bool {
        self.nav().is_completed(lesson_id)
    }

    #[must_use]
    pub fn is_lesson_locked(&self, lesson: &LessonRef) -> bool {
        self.nav().is_lesson_locked(lesson)
    }

    #[must_use]
    pub fn is_unlocked(&self, lesson_id: LessonId) -> bool {
        self.nav().is_unlocked(lesson_id)
    }

    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.nav().progress_percentage()
    }

    #[must_use]
    pub fn next_lesson(&self, current: LessonId) -> Option<LessonRef> {
        self.nav().next_lesson(current).cloned()
    }

    #[must_use]
    pub fn previous_lesson(&self, current: LessonId) -> Option<LessonRef> {
        self.nav().previous_lesson(current).cloned()
    }

    /// Receiver that observes the aggregate percentage.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.percentage.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> CourseNav {
        self.nav().clone()
    }
}

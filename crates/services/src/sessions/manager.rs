use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use course_core::model::{LessonId, LessonProgressState, LessonType, TrackingPolicy};
use remote::{ProgressSessionClient, RemoteError};

use super::lesson::{AttachedLesson, LessonHandle};
use crate::completion::CompletionCallback;
use crate::config::TrackerConfig;
use crate::task::ScheduledTask;

/// The mounted lesson together with the timers it owns.
///
/// Dropping it is the teardown: timers are cancelled first, then the open
/// watch session (if any) is stopped in the background.
struct Attachment {
    lesson: Arc<AttachedLesson>,
    tasks: Vec<ScheduledTask>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.cancel();
        }
        self.lesson.detach();
    }
}

/// Completion tracking for video and reading lessons.
///
/// Holds at most one attached lesson. Video lessons open a remote watch
/// session on first play and heartbeat it while playing; reading lessons
/// accumulate on-screen time until the dwell threshold. Either path raises
/// the completion callback at most once per attachment.
pub struct ProgressSessionManager {
    client: Arc<dyn ProgressSessionClient>,
    config: TrackerConfig,
    on_complete: CompletionCallback,
    current: Mutex<Option<Attachment>>,
}

impl ProgressSessionManager {
    #[must_use]
    pub fn new(
        client: Arc<dyn ProgressSessionClient>,
        config: TrackerConfig,
        on_complete: CompletionCallback,
    ) -> Self {
        Self {
            client,
            config,
            on_complete,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Attachment>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_lesson(&self) -> Option<Arc<AttachedLesson>> {
        self.current()
            .as_ref()
            .map(|attachment| Arc::clone(&attachment.lesson))
    }

    /// Attach a lesson, tearing down whatever was attached before.
    ///
    /// Re-attaching the lesson that is already attached returns the existing
    /// handle untouched.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn attach(
        &self,
        lesson_id: LessonId,
        lesson_type: LessonType,
        duration_seconds: u32,
        already_completed: bool,
    ) -> LessonHandle {
        let mut current = self.current();
        if let Some(existing) = current.as_ref() {
            if existing.lesson.identity() == (lesson_id, lesson_type) {
                return LessonHandle {
                    lesson: Arc::clone(&existing.lesson),
                };
            }
        }
        // Previous lesson is torn down before the new one starts its timers.
        drop(current.take());

        let lesson = Arc::new(AttachedLesson::new(
            Arc::clone(&self.client),
            Arc::clone(&self.on_complete),
            self.config.dwell_threshold,
            LessonProgressState::new(lesson_id, lesson_type, duration_seconds, already_completed),
        ));
        let tasks = self.spawn_timers(&lesson);
        tracing::debug!(%lesson_id, %lesson_type, timers = tasks.len(), "lesson attached");

        *current = Some(Attachment {
            lesson: Arc::clone(&lesson),
            tasks,
        });
        LessonHandle { lesson }
    }

    fn spawn_timers(&self, lesson: &Arc<AttachedLesson>) -> Vec<ScheduledTask> {
        let (_, lesson_type) = lesson.identity();
        match lesson_type.tracking() {
            TrackingPolicy::WatchSession => {
                let loader = Arc::clone(lesson);
                let heartbeat = Arc::clone(lesson);
                vec![
                    ScheduledTask::spawn("progress-load", async move {
                        loader.load_progress().await;
                    }),
                    ScheduledTask::every("heartbeat", self.config.heartbeat_interval, move || {
                        let lesson = Arc::clone(&heartbeat);
                        async move { lesson.heartbeat_tick().await }
                    }),
                ]
            }
            TrackingPolicy::DwellTimer => {
                let dwell = Arc::clone(lesson);
                let tick = self.config.dwell_tick;
                vec![ScheduledTask::every("dwell", tick, move || {
                    let lesson = Arc::clone(&dwell);
                    async move { lesson.dwell_tick(tick).await }
                })]
            }
            // Quiz and coding completion comes from their own engines.
            TrackingPolicy::Attempt | TrackingPolicy::CodeSubmission => Vec::new(),
        }
    }

    /// Playback started (video) or content became visible (reading).
    pub async fn on_play(&self) {
        let Some(lesson) = self.current_lesson() else {
            tracing::debug!("play ignored: no lesson attached");
            return;
        };
        lesson.play().await;
    }

    /// Playback paused or content hidden. The watch session stays open.
    pub fn on_pause(&self) {
        if let Some(lesson) = self.current_lesson() {
            lesson.pause();
        }
    }

    /// Complete the attached lesson on the viewer's request.
    ///
    /// Persists the completion first; the callback fires only if no heartbeat
    /// or dwell tick completed the lesson in the meantime. Without an
    /// attachment this is a no-op returning `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns the authority's error when the completion could not be persisted.
    pub async fn mark_complete(&self) -> Result<bool, RemoteError> {
        let Some(lesson) = self.current_lesson() else {
            tracing::debug!("manual completion ignored: no lesson attached");
            return Ok(false);
        };
        lesson.mark_complete().await
    }

    /// Tear down the attached lesson, if any.
    pub fn detach(&self) {
        let previous = self.current().take();
        if let Some(attachment) = previous {
            tracing::debug!(lesson_id = %attachment.lesson.identity().0, "lesson detached");
        }
    }

    #[must_use]
    pub fn handle(&self) -> Option<LessonHandle> {
        self.current_lesson().map(|lesson| LessonHandle { lesson })
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl Drop for ProgressSessionManager {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use course_core::time::fixed_clock;
    use remote::{Endpoint, InMemoryAuthority};

    fn manager(authority: &InMemoryAuthority) -> (ProgressSessionManager, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let manager = ProgressSessionManager::new(
            Arc::new(authority.clone()),
            TrackerConfig::default(),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (manager, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn reattaching_same_lesson_keeps_state() {
        let authority = InMemoryAuthority::new(fixed_clock());
        let (manager, _) = manager(&authority);
        let lesson = LessonId::new(1);

        manager.attach(lesson, LessonType::Video, 600, false);
        manager.on_play().await;
        let key = manager.handle().unwrap().session_key();
        assert!(key.is_some());

        let again = manager.attach(lesson, LessonType::Video, 600, false);
        assert_eq!(again.session_key(), key);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(authority.calls(Endpoint::GetProgress), 1);
        assert_eq!(authority.calls(Endpoint::StartWatchSession), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quiz_lessons_attach_without_timers() {
        let authority = InMemoryAuthority::new(fixed_clock());
        let (manager, fired) = manager(&authority);

        let handle = manager.attach(LessonId::new(5), LessonType::Quiz, 0, false);
        manager.on_play().await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!handle.is_completed());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(authority.calls(Endpoint::StartWatchSession), 0);
        assert_eq!(authority.calls(Endpoint::GetProgress), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn play_without_attachment_is_ignored() {
        let authority = InMemoryAuthority::new(fixed_clock());
        let (manager, _) = manager(&authority);
        manager.on_play().await;
        manager.on_pause();
        assert!(manager.handle().is_none());
        assert_eq!(authority.calls(Endpoint::StartWatchSession), 0);
    }
}

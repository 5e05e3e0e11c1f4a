use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use course_core::model::{LessonId, LessonProgressState, LessonType, SessionKey};
use remote::dto::ProgressUpdate;
use remote::{ProgressSessionClient, RemoteError};

use crate::completion::CompletionCallback;
use crate::guard::ResetOnDrop;

/// Mutable state of one attached lesson.
#[derive(Debug)]
struct LessonRuntime {
    progress: LessonProgressState,
    /// Video is playing, or reading content is on screen.
    active: bool,
    start_in_flight: bool,
    dwell_elapsed: Duration,
    detached: bool,
}

/// One lesson attachment, shared between the manager and the timers it owns.
pub(crate) struct AttachedLesson {
    client: Arc<dyn ProgressSessionClient>,
    on_complete: CompletionCallback,
    dwell_threshold: Duration,
    state: Mutex<LessonRuntime>,
}

impl AttachedLesson {
    pub(crate) fn new(
        client: Arc<dyn ProgressSessionClient>,
        on_complete: CompletionCallback,
        dwell_threshold: Duration,
        progress: LessonProgressState,
    ) -> Self {
        Self {
            client,
            on_complete,
            dwell_threshold,
            state: Mutex::new(LessonRuntime {
                progress,
                active: false,
                start_in_flight: false,
                dwell_elapsed: Duration::ZERO,
                detached: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LessonRuntime> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn identity(&self) -> (LessonId, LessonType) {
        let state = self.state();
        (state.progress.lesson_id(), state.progress.lesson_type())
    }

    /// Flip the completion flag and raise the callback if this call flipped it.
    fn complete(&self, source: &'static str) -> bool {
        let lesson_id = {
            let mut state = self.state();
            if state.detached || !state.progress.mark_completed() {
                return false;
            }
            state.progress.lesson_id()
        };
        self.announce(lesson_id, source);
        true
    }

    /// Raise the callback for a flag flip that already happened under the lock.
    fn announce(&self, lesson_id: LessonId, source: &'static str) {
        tracing::info!(%lesson_id, source, "lesson completion reached");
        (self.on_complete)(lesson_id);
    }

    // ─── Events ────────────────────────────────────────────────────────────────

    pub(crate) async fn play(&self) {
        let lesson_id = {
            let mut state = self.state();
            state.active = true;
            if state.progress.lesson_type() != LessonType::Video
                || state.detached
                || state.progress.is_completed()
                || state.progress.has_open_session()
                || state.start_in_flight
            {
                return;
            }
            state.start_in_flight = true;
            state.progress.lesson_id()
        };

        let in_flight = ResetOnDrop::new(|| self.state().start_in_flight = false);
        let started = self.client.start_watch_session(lesson_id).await;
        in_flight.disarm();

        let orphan = {
            let mut state = self.state();
            state.start_in_flight = false;
            match started {
                Ok(key) if state.detached => Some(key),
                Ok(key) => match state.progress.open_session(key.clone()) {
                    Ok(()) => {
                        tracing::debug!(%lesson_id, session_key = %key, "watch session opened");
                        None
                    }
                    Err(err) => {
                        tracing::warn!(%lesson_id, error = %err, "discarding extra watch session");
                        Some(key)
                    }
                },
                Err(err) => {
                    tracing::warn!(%lesson_id, error = %err, "failed to start watch session; retrying on next play");
                    None
                }
            }
        };

        if let Some(key) = orphan {
            stop_in_background(Arc::clone(&self.client), lesson_id, key);
        }
    }

    pub(crate) fn pause(&self) {
        self.state().active = false;
    }

    /// Persist completion on the viewer's request, then flip the flag.
    ///
    /// Returns whether this call completed the lesson; a heartbeat or dwell
    /// tick that got there first makes it a no-op.
    pub(crate) async fn mark_complete(&self) -> Result<bool, RemoteError> {
        let (lesson_id, update) = {
            let state = self.state();
            if state.detached || state.progress.is_completed() {
                return Ok(false);
            }
            let dwell = u32::try_from(state.dwell_elapsed.as_secs()).unwrap_or(u32::MAX);
            let update = ProgressUpdate {
                completed: true,
                watched_seconds: state.progress.watched_seconds().max(dwell),
            };
            (state.progress.lesson_id(), update)
        };

        if let Err(err) = self.client.update_progress(lesson_id, update).await {
            tracing::warn!(%lesson_id, error = %err, "failed to persist manual completion");
            return Err(err);
        }
        Ok(self.complete("manual"))
    }

    // ─── Timers ────────────────────────────────────────────────────────────────

    /// Apply the persisted progress fetched right after attaching.
    pub(crate) async fn load_progress(&self) {
        let lesson_id = self.identity().0;
        match self.client.get_progress(lesson_id).await {
            Ok(progress) => {
                let newly_completed = {
                    let mut state = self.state();
                    if state.detached {
                        return;
                    }
                    state.progress.apply_remote(progress)
                };
                if newly_completed {
                    self.announce(lesson_id, "initial-load");
                }
            }
            Err(err) => {
                tracing::warn!(%lesson_id, error = %err, "failed to load lesson progress");
            }
        }
    }

    pub(crate) async fn heartbeat_tick(&self) -> ControlFlow<()> {
        let (lesson_id, key) = {
            let state = self.state();
            if state.detached || state.progress.is_completed() {
                return ControlFlow::Break(());
            }
            if !state.active {
                return ControlFlow::Continue(());
            }
            let Some(key) = state.progress.session_key().cloned() else {
                return ControlFlow::Continue(());
            };
            (state.progress.lesson_id(), key)
        };

        match self.client.heartbeat(lesson_id, &key).await {
            Ok(response) => {
                if let Some(watched) = response.watched_seconds {
                    self.state().progress.record_watched(watched);
                }
                if response.is_completed {
                    self.complete("heartbeat");
                    return ControlFlow::Break(());
                }
            }
            Err(err) => {
                tracing::warn!(%lesson_id, session_key = %key, error = %err, "heartbeat failed");
            }
        }
        ControlFlow::Continue(())
    }

    pub(crate) async fn dwell_tick(&self, tick: Duration) -> ControlFlow<()> {
        let (lesson_id, elapsed) = {
            let mut state = self.state();
            if state.detached || state.progress.is_completed() {
                return ControlFlow::Break(());
            }
            if !state.active {
                return ControlFlow::Continue(());
            }
            state.dwell_elapsed += tick;
            if state.dwell_elapsed < self.dwell_threshold {
                return ControlFlow::Continue(());
            }
            (state.progress.lesson_id(), state.dwell_elapsed)
        };

        let update = ProgressUpdate {
            completed: true,
            watched_seconds: u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX),
        };
        match self.client.update_progress(lesson_id, update).await {
            Ok(()) => {
                self.complete("dwell");
                ControlFlow::Break(())
            }
            Err(err) => {
                tracing::warn!(%lesson_id, error = %err, "failed to persist reading completion");
                ControlFlow::Continue(())
            }
        }
    }

    // ─── Teardown ──────────────────────────────────────────────────────────────

    /// Mark the attachment dead and close its session unless completed.
    ///
    /// Never waits on the authority.
    pub(crate) fn detach(&self) {
        let stop = {
            let mut state = self.state();
            if state.detached {
                return;
            }
            state.detached = true;
            state.active = false;
            let key = state.progress.close_session();
            if state.progress.is_completed() {
                None
            } else {
                key.map(|key| (state.progress.lesson_id(), key))
            }
        };
        if let Some((lesson_id, key)) = stop {
            stop_in_background(Arc::clone(&self.client), lesson_id, key);
        }
    }

    pub(crate) fn snapshot(&self) -> LessonSnapshot {
        let state = self.state();
        LessonSnapshot {
            lesson_id: state.progress.lesson_id(),
            lesson_type: state.progress.lesson_type(),
            is_completed: state.progress.is_completed(),
            session_key: state.progress.session_key().cloned(),
            resume_position: state.progress.resume_position(),
            active: state.active,
            dwell_elapsed: state.dwell_elapsed,
            attached: !state.detached,
        }
    }
}

/// Fire-and-forget `stop_watch_session`; failures are logged, never retried.
fn stop_in_background(client: Arc<dyn ProgressSessionClient>, lesson_id: LessonId, key: SessionKey) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(%lesson_id, session_key = %key, "no runtime to stop watch session");
        return;
    };
    runtime.spawn(async move {
        match client.stop_watch_session(lesson_id, &key).await {
            Ok(()) => tracing::debug!(%lesson_id, session_key = %key, "watch session stopped"),
            Err(err) => {
                tracing::warn!(%lesson_id, session_key = %key, error = %err, "failed to stop watch session");
            }
        }
    });
}

/// Point-in-time view of an attached lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonSnapshot {
    pub lesson_id: LessonId,
    pub lesson_type: LessonType,
    pub is_completed: bool,
    pub session_key: Option<SessionKey>,
    /// Position (seconds) playback should resume from.
    pub resume_position: u32,
    pub active: bool,
    pub dwell_elapsed: Duration,
    pub attached: bool,
}

/// Read handle for the lesson returned by `ProgressSessionManager::attach`.
#[derive(Clone)]
pub struct LessonHandle {
    pub(crate) lesson: Arc<AttachedLesson>,
}

impl LessonHandle {
    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson.identity().0
    }

    #[must_use]
    pub fn snapshot(&self) -> LessonSnapshot {
        self.lesson.snapshot()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.snapshot().is_completed
    }

    #[must_use]
    pub fn session_key(&self) -> Option<SessionKey> {
        self.snapshot().session_key
    }

    /// Complete the lesson on the viewer's request.
    ///
    /// # Errors
    ///
    /// Returns the authority's error when the completion could not be persisted;
    /// the lesson then stays incomplete.
    pub async fn mark_complete(&self) -> Result<bool, RemoteError> {
        self.lesson.mark_complete().await
    }
}

impl std::fmt::Debug for LessonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("LessonHandle")
            .field("lesson_id", &snapshot.lesson_id)
            .field("lesson_type", &snapshot.lesson_type)
            .field("is_completed", &snapshot.is_completed)
            .finish_non_exhaustive()
    }
}

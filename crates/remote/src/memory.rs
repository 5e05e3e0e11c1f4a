use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use uuid::Uuid;

use course_core::Clock;
use course_core::model::{
    AttemptId, AttemptResult, LessonId, LessonProgress, OptionId, QuestionId, QuizId, SessionKey,
};

use crate::client::{CodeSubmissionClient, ProgressSessionClient, QuizAttemptClient};
use crate::dto::{
    CodeRunResult, CodeSubmission, HeartbeatResponse, ProgressUpdate, StartAttemptResponse,
    SubmitAttemptRequest,
};
use crate::error::RemoteError;

/// Authority endpoints, used to script failures and latency and to count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetProgress,
    StartWatchSession,
    Heartbeat,
    StopWatchSession,
    UpdateProgress,
    StartAttempt,
    SubmitAttempt,
    SubmitCode,
}

/// Quiz definition graded by the in-memory authority.
#[derive(Debug, Clone)]
pub struct QuizDefinition {
    pub time_limit_seconds: u32,
    pub answer_key: HashMap<QuestionId, OptionId>,
    /// Minimum score (0-100) needed to pass.
    pub pass_score: f64,
}

/// Coding exercise graded by the in-memory authority.
///
/// A submission passes when its source contains every expected snippet.
#[derive(Debug, Clone)]
pub struct ExerciseDefinition {
    pub expected_snippets: Vec<String>,
}

#[derive(Debug)]
struct OpenAttempt {
    quiz_id: QuizId,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct AuthorityState {
    progress: HashMap<LessonId, LessonProgress>,
    heartbeats_to_complete: HashMap<LessonId, u32>,
    heartbeats_seen: HashMap<LessonId, u32>,
    open_sessions: HashMap<SessionKey, LessonId>,
    stopped_sessions: Vec<SessionKey>,
    updates: Vec<(LessonId, ProgressUpdate)>,
    quizzes: HashMap<QuizId, QuizDefinition>,
    attempts: HashMap<AttemptId, OpenAttempt>,
    next_attempt: u64,
    submissions: Vec<(AttemptId, SubmitAttemptRequest)>,
    report_expired: bool,
    exercises: HashMap<LessonId, ExerciseDefinition>,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, usize>,
    latency: HashMap<Endpoint, Duration>,
}

/// Scripted authority kept in memory, for tests and offline demos.
///
/// Clones share state, so a test can hand one clone to the component under
/// test and inspect another.
#[derive(Clone, Default)]
pub struct InMemoryAuthority {
    clock: Clock,
    state: Arc<Mutex<AuthorityState>>,
}

impl InMemoryAuthority {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(AuthorityState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AuthorityState>, RemoteError> {
        self.state
            .lock()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    fn read<T>(&self, f: impl FnOnce(&AuthorityState) -> T) -> T
    where
        T: Default,
    {
        self.lock().map(|guard| f(&guard)).unwrap_or_default()
    }

    fn write(&self, f: impl FnOnce(&mut AuthorityState)) {
        if let Ok(mut guard) = self.lock() {
            f(&mut guard);
        }
    }

    // ─── Scripting ─────────────────────────────────────────────────────────────

    pub fn set_progress(&self, lesson_id: LessonId, progress: LessonProgress) {
        self.write(|s| {
            s.progress.insert(lesson_id, progress);
        });
    }

    /// The `count`-th heartbeat for the lesson reports completion.
    pub fn complete_after_heartbeats(&self, lesson_id: LessonId, count: u32) {
        self.write(|s| {
            s.heartbeats_to_complete.insert(lesson_id, count);
        });
    }

    pub fn register_quiz(&self, quiz_id: QuizId, quiz: QuizDefinition) {
        self.write(|s| {
            s.quizzes.insert(quiz_id, quiz);
        });
    }

    pub fn register_exercise(&self, lesson_id: LessonId, exercise: ExerciseDefinition) {
        self.write(|s| {
            s.exercises.insert(lesson_id, exercise);
        });
    }

    /// Report every subsequent graded attempt as expired.
    pub fn report_expired(&self, expired: bool) {
        self.write(|s| s.report_expired = expired);
    }

    /// Fail the next `count` calls to `endpoint` with `RemoteError::Unavailable`.
    pub fn fail_next(&self, endpoint: Endpoint, count: usize) {
        self.write(|s| {
            s.failures.insert(endpoint, count);
        });
    }

    /// Delay every call to `endpoint` by `delay` before it is served.
    pub fn set_latency(&self, endpoint: Endpoint, delay: Duration) {
        self.write(|s| {
            s.latency.insert(endpoint, delay);
        });
    }

    // ─── Inspection ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.read(|s| s.calls.get(&endpoint).copied().unwrap_or(0))
    }

    #[must_use]
    pub fn progress(&self, lesson_id: LessonId) -> LessonProgress {
        self.read(|s| s.progress.get(&lesson_id).copied().unwrap_or_default())
    }

    #[must_use]
    pub fn open_session_count(&self, lesson_id: LessonId) -> usize {
        self.read(|s| s.open_sessions.values().filter(|id| **id == lesson_id).count())
    }

    #[must_use]
    pub fn stopped_sessions(&self) -> Vec<SessionKey> {
        self.read(|s| s.stopped_sessions.clone())
    }

    #[must_use]
    pub fn updates(&self) -> Vec<(LessonId, ProgressUpdate)> {
        self.read(|s| s.updates.clone())
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<(AttemptId, SubmitAttemptRequest)> {
        self.read(|s| s.submissions.clone())
    }

    // ─── Call plumbing ─────────────────────────────────────────────────────────

    /// Count the call, wait out any scripted latency and consume a scripted failure.
    async fn enter(&self, endpoint: Endpoint) -> Result<(), RemoteError> {
        let delay = {
            let mut state = self.lock()?;
            *state.calls.entry(endpoint).or_insert(0) += 1;
            state.latency.get(&endpoint).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock()?;
        match state.failures.get_mut(&endpoint) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(RemoteError::Unavailable(format!("scripted {endpoint:?} failure")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProgressSessionClient for InMemoryAuthority {
    async fn get_progress(&self, lesson_id: LessonId) -> Result<LessonProgress, RemoteError> {
        self.enter(Endpoint::GetProgress).await?;
        let state = self.lock()?;
        Ok(state.progress.get(&lesson_id).copied().unwrap_or_default())
    }

    async fn start_watch_session(&self, lesson_id: LessonId) -> Result<SessionKey, RemoteError> {
        self.enter(Endpoint::StartWatchSession).await?;
        let key = SessionKey::new(Uuid::new_v4().to_string());
        let mut state = self.lock()?;
        state.open_sessions.insert(key.clone(), lesson_id);
        Ok(key)
    }

    async fn heartbeat(
        &self,
        lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<HeartbeatResponse, RemoteError> {
        self.enter(Endpoint::Heartbeat).await?;
        let mut state = self.lock()?;
        if state.open_sessions.get(session_key) != Some(&lesson_id) {
            return Err(RemoteError::NotFound);
        }

        let seen = {
            let seen = state.heartbeats_seen.entry(lesson_id).or_insert(0);
            *seen += 1;
            *seen
        };
        let threshold = state.heartbeats_to_complete.get(&lesson_id).copied();
        let progress = state.progress.entry(lesson_id).or_default();
        if threshold.is_some_and(|needed| seen >= needed) {
            progress.is_completed = true;
        }
        Ok(HeartbeatResponse {
            is_completed: progress.is_completed,
            watched_seconds: Some(progress.watched_seconds),
        })
    }

    async fn stop_watch_session(
        &self,
        _lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<(), RemoteError> {
        self.enter(Endpoint::StopWatchSession).await?;
        let mut state = self.lock()?;
        state
            .open_sessions
            .remove(session_key)
            .ok_or(RemoteError::NotFound)?;
        state.stopped_sessions.push(session_key.clone());
        Ok(())
    }

    async fn update_progress(
        &self,
        lesson_id: LessonId,
        update: ProgressUpdate,
    ) -> Result<(), RemoteError> {
        self.enter(Endpoint::UpdateProgress).await?;
        let mut state = self.lock()?;
        let progress = state.progress.entry(lesson_id).or_default();
        progress.watched_seconds = progress.watched_seconds.max(update.watched_seconds);
        progress.is_completed |= update.completed;
        state.updates.push((lesson_id, update));
        Ok(())
    }
}

#[async_trait]
impl QuizAttemptClient for InMemoryAuthority {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartAttemptResponse, RemoteError> {
        self.enter(Endpoint::StartAttempt).await?;
        let mut state = self.lock()?;
        let quiz = state.quizzes.get(&quiz_id).ok_or(RemoteError::NotFound)?;
        let time_limit_seconds = quiz.time_limit_seconds;
        let total_questions = u32::try_from(quiz.answer_key.len()).unwrap_or(u32::MAX);

        state.next_attempt += 1;
        let attempt_id = AttemptId::new(state.next_attempt);
        let expires_at =
            self.clock.now() + ChronoDuration::seconds(i64::from(time_limit_seconds));
        state.attempts.insert(attempt_id, OpenAttempt {
            quiz_id,
            expires_at,
        });

        Ok(StartAttemptResponse {
            attempt_id,
            expires_at,
            time_limit_seconds,
            total_questions,
        })
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        request: &SubmitAttemptRequest,
    ) -> Result<AttemptResult, RemoteError> {
        self.enter(Endpoint::SubmitAttempt).await?;
        let mut state = self.lock()?;
        let attempt = state.attempts.remove(&attempt_id).ok_or(RemoteError::NotFound)?;
        let quiz = state
            .quizzes
            .get(&attempt.quiz_id)
            .ok_or(RemoteError::NotFound)?;

        let correct = request
            .answers
            .iter()
            .filter(|answer| {
                quiz.answer_key
                    .get(&answer.question_id)
                    .is_some_and(|key| answer.selected_option_ids == [*key])
            })
            .count();
        let correct_answers = u32::try_from(correct).unwrap_or(u32::MAX);
        let total_questions = u32::try_from(quiz.answer_key.len()).unwrap_or(u32::MAX);
        let score = if total_questions == 0 {
            0.0
        } else {
            f64::from(correct_answers) * 100.0 / f64::from(total_questions)
        };
        let expired = state.report_expired || self.clock.has_passed(attempt.expires_at);
        let result = AttemptResult {
            score,
            passed: !expired && score >= quiz.pass_score,
            correct_answers,
            total_questions,
            expired,
        };
        state.submissions.push((attempt_id, request.clone()));
        Ok(result)
    }
}

#[async_trait]
impl CodeSubmissionClient for InMemoryAuthority {
    async fn submit_code(
        &self,
        lesson_id: LessonId,
        submission: &CodeSubmission,
    ) -> Result<CodeRunResult, RemoteError> {
        self.enter(Endpoint::SubmitCode).await?;
        let state = self.lock()?;
        let exercise = state.exercises.get(&lesson_id).ok_or(RemoteError::NotFound)?;

        let passing = exercise
            .expected_snippets
            .iter()
            .filter(|snippet| submission.source.contains(snippet.as_str()))
            .count();
        let passed_tests = u32::try_from(passing).unwrap_or(u32::MAX);
        let total_tests = u32::try_from(exercise.expected_snippets.len()).unwrap_or(u32::MAX);
        Ok(CodeRunResult {
            passed: passed_tests == total_tests,
            passed_tests,
            total_tests,
            output: format!("{passed_tests}/{total_tests} checks passed"),
        })
    }
}

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use course_core::Clock;
use course_core::model::{
    AttemptGrant, AttemptId, AttemptResult, AttemptStatus, LessonId, OptionId, QuestionId,
    QuizAttempt, QuizId,
};
use remote::{QuizAttemptClient, RemoteError};
use remote::dto::SubmitAttemptRequest;

use crate::completion::CompletionCallback;
use crate::config::TrackerConfig;
use crate::error::QuizError;
use crate::guard::ResetOnDrop;
use crate::task::ScheduledTask;

/// What a `submit` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    /// Another submit already owns the attempt, or it is not in progress.
    Ignored,
    Submitted(AttemptResult),
    /// The authority graded the attempt as past its deadline.
    Expired(AttemptResult),
}

impl SubmitOutcome {
    #[must_use]
    pub fn result(&self) -> Option<&AttemptResult> {
        match self {
            SubmitOutcome::Ignored => None,
            SubmitOutcome::Submitted(result) | SubmitOutcome::Expired(result) => Some(result),
        }
    }
}

/// Point-in-time view of the attempt for a quiz screen.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSnapshot {
    pub status: AttemptStatus,
    pub attempt_id: Option<AttemptId>,
    pub remaining_seconds: u32,
    pub answered: usize,
    pub total_questions: u32,
    pub last_error: Option<String>,
    pub result: Option<AttemptResult>,
}

#[derive(Debug, Default)]
struct AttemptRuntime {
    attempt: Option<QuizAttempt>,
    remaining_seconds: u32,
    /// Set by whichever submit call got in first; cleared when it fails.
    submit_requested: bool,
    /// One-shot latch for the countdown's own submit.
    auto_submit_fired: bool,
    start_in_flight: bool,
    last_error: Option<String>,
}

impl AttemptRuntime {
    fn status(&self) -> AttemptStatus {
        self.attempt
            .as_ref()
            .map_or(AttemptStatus::NotStarted, QuizAttempt::status)
    }
}

struct EngineShared {
    client: Arc<dyn QuizAttemptClient>,
    clock: Clock,
    lesson_id: LessonId,
    on_complete: CompletionCallback,
    countdown_tick: Duration,
    state: Mutex<AttemptRuntime>,
    countdown: Mutex<Option<ScheduledTask>>,
}

impl EngineShared {
    fn state(&self) -> MutexGuard<'_, AttemptRuntime> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_countdown(&self) {
        self.countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn countdown_tick(self: &Arc<Self>) -> ControlFlow<()> {
        let step = u32::try_from(self.countdown_tick.as_secs())
            .unwrap_or(u32::MAX)
            .max(1);
        {
            let mut state = self.state();
            let status = state.status();
            if status.is_terminal() || status == AttemptStatus::NotStarted {
                return ControlFlow::Break(());
            }
            state.remaining_seconds = state.remaining_seconds.saturating_sub(step);
            if state.remaining_seconds > 0 {
                return ControlFlow::Continue(());
            }
            // A submit already in flight settles the attempt on its own.
            if state.auto_submit_fired || state.submit_requested {
                return ControlFlow::Break(());
            }
            state.auto_submit_fired = true;
        }

        tracing::info!(lesson_id = %self.lesson_id, "time limit reached; auto-submitting");
        match self.submit(true).await {
            Ok(outcome) => {
                tracing::debug!(lesson_id = %self.lesson_id, ?outcome, "auto-submit settled");
            }
            Err(err) => {
                tracing::warn!(lesson_id = %self.lesson_id, error = %err, "auto-submit failed");
            }
        }
        ControlFlow::Break(())
    }

    /// Claim the attempt for one submission and send it.
    ///
    /// The authority call and the settlement run on their own task, so a
    /// caller that stops waiting still leaves the attempt settled.
    async fn submit(self: &Arc<Self>, auto: bool) -> Result<SubmitOutcome, QuizError> {
        let (attempt_id, request) = {
            let mut state = self.state();
            if state.status() != AttemptStatus::InProgress || state.submit_requested {
                tracing::debug!(
                    lesson_id = %self.lesson_id,
                    status = %state.status(),
                    auto,
                    "submit ignored"
                );
                return Ok(SubmitOutcome::Ignored);
            }
            let Some(attempt) = state.attempt.as_mut() else {
                return Ok(SubmitOutcome::Ignored);
            };
            let Some(attempt_id) = attempt.attempt_id() else {
                return Ok(SubmitOutcome::Ignored);
            };
            attempt.begin_submit()?;
            let request = SubmitAttemptRequest::from_sheet(attempt.answer_sheet());
            state.submit_requested = true;
            (attempt_id, request)
        };

        let shared = Arc::clone(self);
        let sending = tokio::spawn(async move {
            let submitted = shared.client.submit_attempt(attempt_id, &request).await;
            shared.settle(attempt_id, submitted, auto)
        });
        match sending.await {
            Ok(settled) => settled,
            Err(err) => self.settle(
                attempt_id,
                Err(RemoteError::Unavailable(format!("submission task stopped: {err}"))),
                auto,
            ),
        }
    }

    fn settle(
        &self,
        attempt_id: AttemptId,
        submitted: Result<AttemptResult, RemoteError>,
        auto: bool,
    ) -> Result<SubmitOutcome, QuizError> {
        let mut state = self.state();
        let remaining = state.remaining_seconds;
        let Some(attempt) = state
            .attempt
            .as_mut()
            .filter(|attempt| attempt.attempt_id() == Some(attempt_id))
        else {
            return Ok(SubmitOutcome::Ignored);
        };
        match submitted {
            Ok(result) => {
                let status = attempt.finish_submit(result)?;
                state.last_error = None;
                drop(state);
                self.stop_countdown();

                tracing::info!(
                    lesson_id = %self.lesson_id,
                    %attempt_id,
                    %status,
                    score = result.score,
                    passed = result.passed,
                    auto,
                    "quiz attempt graded"
                );
                if status == AttemptStatus::Expired {
                    return Ok(SubmitOutcome::Expired(result));
                }
                if result.passed {
                    (self.on_complete)(self.lesson_id);
                }
                Ok(SubmitOutcome::Submitted(result))
            }
            Err(source) => {
                let deadline_open = attempt
                    .grant()
                    .is_some_and(|grant| !self.clock.has_passed(grant.expires_at));
                let status = attempt.fail_submit(remaining > 0 && deadline_open)?;
                state.submit_requested = false;
                state.last_error = Some(source.to_string());
                drop(state);
                if status.is_terminal() {
                    self.stop_countdown();
                }

                tracing::warn!(
                    lesson_id = %self.lesson_id,
                    %attempt_id,
                    %status,
                    error = %source,
                    "quiz submission failed"
                );
                Err(QuizError::Submit { source, status })
            }
        }
    }
}

/// Drives one timed quiz attempt: start, countdown, answers and submit.
///
/// A manual submit and the countdown's auto-submit can race into the same
/// transition; the submit-requested flag and the `InProgress` status check
/// together make sure only one `submit_attempt` call goes out.
pub struct QuizAttemptEngine {
    shared: Arc<EngineShared>,
}

impl QuizAttemptEngine {
    #[must_use]
    pub fn new(
        client: Arc<dyn QuizAttemptClient>,
        lesson_id: LessonId,
        clock: Clock,
        config: &TrackerConfig,
        on_complete: CompletionCallback,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                client,
                clock,
                lesson_id,
                on_complete,
                countdown_tick: config.countdown_tick,
                state: Mutex::new(AttemptRuntime::default()),
                countdown: Mutex::new(None),
            }),
        }
    }

    /// Open an attempt and start its countdown.
    ///
    /// The remaining time comes from the authority's grant, never from a
    /// local guess. Once the previous attempt is `Submitted` or `Expired`,
    /// starting again discards it and opens a retake.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadyStarted` if an unsettled attempt exists or
    /// one is being opened, and `QuizError::Start` if the authority refuses.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn start(&self, quiz_id: QuizId) -> Result<AttemptSnapshot, QuizError> {
        {
            let mut state = self.shared.state();
            let unsettled = state.attempt.is_some() && !state.status().is_terminal();
            if unsettled || state.start_in_flight {
                return Err(QuizError::AlreadyStarted(state.status()));
            }
            state.start_in_flight = true;
        }

        let in_flight = ResetOnDrop::new(|| self.shared.state().start_in_flight = false);
        let opened = self.shared.client.start_attempt(quiz_id).await;
        in_flight.disarm();

        {
            let mut state = self.shared.state();
            state.start_in_flight = false;
            let response = match opened {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(%quiz_id, error = %err, "failed to open quiz attempt");
                    state.last_error = Some(err.to_string());
                    return Err(QuizError::Start(err));
                }
            };

            let mut attempt = QuizAttempt::new(quiz_id);
            attempt.begin(AttemptGrant {
                attempt_id: response.attempt_id,
                started_at: self.shared.clock.now(),
                expires_at: response.expires_at,
                time_limit_seconds: response.time_limit_seconds,
                total_questions: response.total_questions,
            })?;
            *state = AttemptRuntime {
                attempt: Some(attempt),
                remaining_seconds: response
                    .time_limit_seconds
                    .min(self.shared.clock.seconds_until(response.expires_at)),
                ..AttemptRuntime::default()
            };
            tracing::info!(
                lesson_id = %self.shared.lesson_id,
                %quiz_id,
                attempt_id = %response.attempt_id,
                remaining = state.remaining_seconds,
                "quiz attempt started"
            );
        }

        self.start_countdown();
        Ok(self.snapshot())
    }

    fn start_countdown(&self) {
        let weak: Weak<EngineShared> = Arc::downgrade(&self.shared);
        let task = ScheduledTask::every("quiz-countdown", self.shared.countdown_tick, move || {
            let weak = Weak::clone(&weak);
            async move {
                match weak.upgrade() {
                    Some(shared) => shared.countdown_tick().await,
                    None => ControlFlow::Break(()),
                }
            }
        });
        *self
            .shared
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Record an answer. Returns `false` outside `InProgress`.
    pub fn select_answer(&self, question_id: QuestionId, option_id: OptionId) -> bool {
        let mut state = self.shared.state();
        let Some(attempt) = state.attempt.as_mut() else {
            return false;
        };
        match attempt.select_answer(question_id, option_id) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(%question_id, error = %err, "answer ignored");
                false
            }
        }
    }

    /// Submit the buffered answers.
    ///
    /// Calls that arrive while another submit is in flight, or once the
    /// attempt is settled, return `SubmitOutcome::Ignored`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Submit` when the authority call fails; the error
    /// carries the status the attempt fell back to.
    pub async fn submit(&self) -> Result<SubmitOutcome, QuizError> {
        self.shared.submit(false).await
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.shared.state().status()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.shared.state().remaining_seconds
    }

    #[must_use]
    pub fn snapshot(&self) -> AttemptSnapshot {
        let state = self.shared.state();
        let attempt = state.attempt.as_ref();
        AttemptSnapshot {
            status: state.status(),
            attempt_id: attempt.and_then(QuizAttempt::attempt_id),
            remaining_seconds: state.remaining_seconds,
            answered: attempt.map_or(0, QuizAttempt::answered_count),
            total_questions: attempt
                .and_then(QuizAttempt::grant)
                .map_or(0, |grant| grant.total_questions),
            last_error: state.last_error.clone(),
            result: attempt.and_then(QuizAttempt::result).copied(),
        }
    }

    /// Stop the countdown, e.g. when the quiz view goes away.
    ///
    /// The attempt itself stays open on the authority until it expires.
    pub fn abandon(&self) {
        self.shared.stop_countdown();
    }
}

impl Drop for QuizAttemptEngine {
    fn drop(&mut self) {
        self.abandon();
    }
}

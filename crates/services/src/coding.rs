use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use course_core::model::LessonId;
use remote::CodeSubmissionClient;
use remote::dto::{CodeRunResult, CodeSubmission};

use crate::completion::CompletionCallback;
use crate::error::CodingError;
use crate::guard::ResetOnDrop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodingOutcome {
    /// A submission for this exercise is already being graded.
    Ignored,
    Graded(CodeRunResult),
}

#[derive(Debug, Default)]
struct ExerciseState {
    in_flight: bool,
    completed: bool,
    last_result: Option<CodeRunResult>,
}

/// Submits code for a coding lesson and completes it on the first passing run.
pub struct CodingExercise {
    client: Arc<dyn CodeSubmissionClient>,
    lesson_id: LessonId,
    on_complete: CompletionCallback,
    state: Mutex<ExerciseState>,
}

impl CodingExercise {
    #[must_use]
    pub fn new(
        client: Arc<dyn CodeSubmissionClient>,
        lesson_id: LessonId,
        already_completed: bool,
        on_complete: CompletionCallback,
    ) -> Self {
        Self {
            client,
            lesson_id,
            on_complete,
            state: Mutex::new(ExerciseState {
                completed: already_completed,
                ..ExerciseState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ExerciseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `source` to the grader.
    ///
    /// # Errors
    ///
    /// Returns `CodingError::EmptySource` for blank input and
    /// `CodingError::Remote` when the grader call fails.
    pub async fn submit(&self, language: &str, source: &str) -> Result<CodingOutcome, CodingError> {
        if source.trim().is_empty() {
            return Err(CodingError::EmptySource);
        }
        {
            let mut state = self.state();
            if state.in_flight {
                tracing::debug!(lesson_id = %self.lesson_id, "code submission already in flight");
                return Ok(CodingOutcome::Ignored);
            }
            state.in_flight = true;
        }

        let submission = CodeSubmission {
            language: language.to_owned(),
            source: source.to_owned(),
        };
        let in_flight = ResetOnDrop::new(|| self.state().in_flight = false);
        let graded = self.client.submit_code(self.lesson_id, &submission).await;
        in_flight.disarm();

        let (fire, result) = {
            let mut state = self.state();
            state.in_flight = false;
            let result = match graded {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(lesson_id = %self.lesson_id, error = %err, "code submission failed");
                    return Err(err.into());
                }
            };
            tracing::info!(
                lesson_id = %self.lesson_id,
                passed = result.passed,
                passed_tests = result.passed_tests,
                total_tests = result.total_tests,
                "code submission graded"
            );
            let newly_completed = result.passed && !state.completed;
            state.completed |= result.passed;
            state.last_result = Some(result.clone());
            (newly_completed, result)
        };

        if fire {
            (self.on_complete)(self.lesson_id);
        }
        Ok(CodingOutcome::Graded(result))
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state().completed
    }

    #[must_use]
    pub fn last_result(&self) -> Option<CodeRunResult> {
        self.state().last_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use course_core::time::fixed_clock;
    use remote::{Endpoint, ExerciseDefinition, InMemoryAuthority};

    const LESSON: LessonId = LessonId::new(40);
    const SOLUTION: &str = "fn add(a: i32, b: i32) -> i32 { a + b }";

    fn exercise(already_completed: bool) -> (InMemoryAuthority, Arc<CodingExercise>, Arc<AtomicUsize>) {
        let authority = InMemoryAuthority::new(fixed_clock());
        authority.register_exercise(LESSON, ExerciseDefinition {
            expected_snippets: vec!["fn add".to_owned(), "a + b".to_owned()],
        });
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let exercise = CodingExercise::new(
            Arc::new(authority.clone()),
            LESSON,
            already_completed,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (authority, Arc::new(exercise), fired)
    }

    #[tokio::test]
    async fn first_passing_run_completes_once() {
        let (_, exercise, fired) = exercise(false);

        let CodingOutcome::Graded(partial) = exercise.submit("rust", "fn add() {}").await.unwrap()
        else {
            panic!("expected a graded run");
        };
        assert!(!partial.passed);
        assert_eq!(partial.passed_tests, 1);
        assert!(!exercise.is_completed());

        exercise.submit("rust", SOLUTION).await.unwrap();
        exercise.submit("rust", SOLUTION).await.unwrap();
        assert!(exercise.is_completed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_source_never_reaches_the_grader() {
        let (authority, exercise, _) = exercise(false);
        assert!(matches!(
            exercise.submit("rust", "  \n").await,
            Err(CodingError::EmptySource)
        ));
        assert_eq!(authority.calls(Endpoint::SubmitCode), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_submissions_are_collapsed() {
        let (authority, exercise, fired) = exercise(false);
        authority.set_latency(Endpoint::SubmitCode, Duration::from_secs(1));

        let (first, second) = tokio::join!(
            exercise.submit("rust", SOLUTION),
            exercise.submit("rust", SOLUTION)
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| **outcome == CodingOutcome::Ignored)
                .count(),
            1
        );
        assert_eq!(authority.calls(Endpoint::SubmitCode), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn grader_failure_releases_the_guard() {
        let (authority, exercise, _) = exercise(false);
        authority.fail_next(Endpoint::SubmitCode, 1);

        assert!(matches!(
            exercise.submit("rust", SOLUTION).await,
            Err(CodingError::Remote(_))
        ));
        assert!(exercise.last_result().is_none());
        exercise.submit("rust", SOLUTION).await.unwrap();
        assert_eq!(authority.calls(Endpoint::SubmitCode), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_submission_releases_the_guard() {
        let (authority, exercise, fired) = exercise(false);
        authority.set_latency(Endpoint::SubmitCode, Duration::from_secs(2));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(500), exercise.submit("rust", SOLUTION)).await;
        assert!(timed_out.is_err());

        authority.set_latency(Endpoint::SubmitCode, Duration::ZERO);
        let outcome = exercise.submit("rust", SOLUTION).await.unwrap();
        assert!(matches!(outcome, CodingOutcome::Graded(result) if result.passed));
        assert_eq!(authority.calls(Endpoint::SubmitCode), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_completed_lessons_do_not_fire_again() {
        let (_, exercise, fired) = exercise(true);
        exercise.submit("rust", SOLUTION).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}

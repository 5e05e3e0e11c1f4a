use std::collections::HashMap;
use std::time::Duration;

use course_core::model::{LessonId, LessonProgress, OptionId, QuestionId, QuizId};
use course_core::time::fixed_clock;
use remote::dto::{CodeSubmission, ProgressUpdate, SubmitAttemptRequest};
use remote::{
    CodeSubmissionClient, Endpoint, ExerciseDefinition, InMemoryAuthority, ProgressSessionClient,
    QuizAttemptClient, QuizDefinition, RemoteError,
};

fn quiz() -> QuizDefinition {
    QuizDefinition {
        time_limit_seconds: 60,
        answer_key: HashMap::from([
            (QuestionId::new(1), OptionId::new(11)),
            (QuestionId::new(2), OptionId::new(21)),
        ]),
        pass_score: 50.0,
    }
}

#[tokio::test]
async fn heartbeat_completes_after_scripted_count() {
    let authority = InMemoryAuthority::new(fixed_clock());
    let lesson = LessonId::new(1);
    authority.complete_after_heartbeats(lesson, 2);

    let key = authority.start_watch_session(lesson).await.unwrap();
    assert!(!authority.heartbeat(lesson, &key).await.unwrap().is_completed);
    assert!(authority.heartbeat(lesson, &key).await.unwrap().is_completed);
    assert!(authority.progress(lesson).is_completed);
    assert_eq!(authority.calls(Endpoint::Heartbeat), 2);
}

#[tokio::test]
async fn heartbeat_for_unknown_session_is_not_found() {
    let authority = InMemoryAuthority::new(fixed_clock());
    let lesson = LessonId::new(1);
    let key = authority.start_watch_session(lesson).await.unwrap();
    authority.stop_watch_session(lesson, &key).await.unwrap();

    let err = authority.heartbeat(lesson, &key).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound));
    assert_eq!(authority.open_session_count(lesson), 0);
    assert_eq!(authority.stopped_sessions(), vec![key]);
}

#[tokio::test]
async fn scripted_failures_are_consumed() {
    let authority = InMemoryAuthority::new(fixed_clock());
    authority.fail_next(Endpoint::GetProgress, 1);

    assert!(authority.get_progress(LessonId::new(1)).await.is_err());
    assert_eq!(
        authority.get_progress(LessonId::new(1)).await.unwrap(),
        LessonProgress::default()
    );
    assert_eq!(authority.calls(Endpoint::GetProgress), 2);
}

#[tokio::test(start_paused = true)]
async fn latency_delays_the_call() {
    let authority = InMemoryAuthority::new(fixed_clock());
    authority.set_latency(Endpoint::UpdateProgress, Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    authority
        .update_progress(
            LessonId::new(3),
            ProgressUpdate {
                completed: true,
                watched_seconds: 30,
            },
        )
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(authority.progress(LessonId::new(3)).is_completed);
}

#[tokio::test]
async fn grades_submitted_attempts() {
    let authority = InMemoryAuthority::new(fixed_clock());
    authority.register_quiz(QuizId::new(4), quiz());

    let started = authority.start_attempt(QuizId::new(4)).await.unwrap();
    assert_eq!(started.time_limit_seconds, 60);
    assert_eq!(started.total_questions, 2);

    let request = SubmitAttemptRequest::from_sheet(vec![
        (QuestionId::new(1), vec![OptionId::new(11)]),
        (QuestionId::new(2), vec![OptionId::new(22)]),
    ]);
    let result = authority
        .submit_attempt(started.attempt_id, &request)
        .await
        .unwrap();
    assert_eq!(result.correct_answers, 1);
    assert!(result.passed);
    assert!(!result.expired);

    // attempts close once graded
    assert!(matches!(
        authority.submit_attempt(started.attempt_id, &request).await,
        Err(RemoteError::NotFound)
    ));
}

#[tokio::test]
async fn expired_attempts_never_pass() {
    let authority = InMemoryAuthority::new(fixed_clock());
    authority.register_quiz(QuizId::new(4), quiz());
    authority.report_expired(true);

    let started = authority.start_attempt(QuizId::new(4)).await.unwrap();
    let request = SubmitAttemptRequest::from_sheet(vec![
        (QuestionId::new(1), vec![OptionId::new(11)]),
        (QuestionId::new(2), vec![OptionId::new(21)]),
    ]);
    let result = authority
        .submit_attempt(started.attempt_id, &request)
        .await
        .unwrap();
    assert!(result.expired);
    assert!(!result.passed);
}

#[tokio::test]
async fn code_submissions_pass_when_all_checks_match() {
    let authority = InMemoryAuthority::new(fixed_clock());
    let lesson = LessonId::new(8);
    authority.register_exercise(lesson, ExerciseDefinition {
        expected_snippets: vec!["fn add".into(), "a + b".into()],
    });

    let partial = authority
        .submit_code(lesson, &CodeSubmission {
            language: "rust".into(),
            source: "fn add(a: i32, b: i32) -> i32 { a - b }".into(),
        })
        .await
        .unwrap();
    assert!(!partial.passed);
    assert_eq!(partial.passed_tests, 1);

    let full = authority
        .submit_code(lesson, &CodeSubmission {
            language: "rust".into(),
            source: "fn add(a: i32, b: i32) -> i32 { a + b }".into(),
        })
        .await
        .unwrap();
    assert!(full.passed);
    assert_eq!(full.total_tests, 2);
}

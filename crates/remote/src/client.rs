use async_trait::async_trait;

use course_core::model::{
    AttemptId, AttemptResult, LessonId, LessonProgress, QuizId, SessionKey,
};

use crate::dto::{
    CodeRunResult, CodeSubmission, HeartbeatResponse, ProgressUpdate, StartAttemptResponse,
    SubmitAttemptRequest,
};
use crate::error::RemoteError;

/// Contract with the authority that owns watch sessions and lesson progress.
#[async_trait]
pub trait ProgressSessionClient: Send + Sync {
    /// Fetch the persisted progress of a lesson.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the authority cannot be reached or rejects the call.
    async fn get_progress(&self, lesson_id: LessonId) -> Result<LessonProgress, RemoteError>;

    /// Open a watch session for a lesson.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the session could not be opened.
    async fn start_watch_session(&self, lesson_id: LessonId) -> Result<SessionKey, RemoteError>;

    /// Report that playback is still running within an open session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` for unknown sessions, or other remote errors.
    async fn heartbeat(
        &self,
        lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<HeartbeatResponse, RemoteError>;

    /// Close a watch session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the authority rejects the call.
    async fn stop_watch_session(
        &self,
        lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<(), RemoteError>;

    /// Persist a progress update.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the update was not stored.
    async fn update_progress(
        &self,
        lesson_id: LessonId,
        update: ProgressUpdate,
    ) -> Result<(), RemoteError>;
}

/// Contract with the authority that opens and grades quiz attempts.
#[async_trait]
pub trait QuizAttemptClient: Send + Sync {
    /// # Errors
    ///
    /// Returns `RemoteError` if no attempt could be opened (including when the
    /// attempt limit is exhausted).
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartAttemptResponse, RemoteError>;

    /// # Errors
    ///
    /// Returns `RemoteError` if the submission was not accepted.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        request: &SubmitAttemptRequest,
    ) -> Result<AttemptResult, RemoteError>;
}

/// Contract with the server-side grader for coding exercises.
#[async_trait]
pub trait CodeSubmissionClient: Send + Sync {
    /// # Errors
    ///
    /// Returns `RemoteError` if the grader could not run the submission.
    async fn submit_code(
        &self,
        lesson_id: LessonId,
        submission: &CodeSubmission,
    ) -> Result<CodeRunResult, RemoteError>;
}

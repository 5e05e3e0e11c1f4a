//! Wire shapes exchanged with the progress authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use course_core::model::{AttemptId, OptionId, QuestionId, SessionKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_key: SessionKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub is_completed: bool,
    /// Authoritative watched duration, when the authority reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_seconds: Option<u32>,
}

/// Body of a persisted progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub completed: bool,
    pub watched_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt_id: AttemptId,
    pub expires_at: DateTime<Utc>,
    pub time_limit_seconds: u32,
    pub total_questions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub question_id: QuestionId,
    pub selected_option_ids: Vec<OptionId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    pub answers: Vec<AnswerPayload>,
}

impl SubmitAttemptRequest {
    #[must_use]
    pub fn from_sheet(sheet: Vec<(QuestionId, Vec<OptionId>)>) -> Self {
        Self {
            answers: sheet
                .into_iter()
                .map(|(question_id, selected_option_ids)| AnswerPayload {
                    question_id,
                    selected_option_ids,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSubmission {
    pub language: String,
    pub source: String,
}

/// Verdict of the server-side grader for a code submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRunResult {
    pub passed: bool,
    pub passed_tests: u32,
    pub total_tests: u32,
    #[serde(default)]
    pub output: String,
}

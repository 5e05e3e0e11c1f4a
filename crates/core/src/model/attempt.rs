use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{AttemptId, OptionId, QuestionId, QuizId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("invalid attempt transition: {from} -> {to}")]
    InvalidTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("attempt is not in progress (status: {0})")]
    NotInProgress(AttemptStatus),
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

/// Lifecycle of a single timed quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitting,
    Submitted,
    Expired,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::Expired)
    }

    /// Whether moving to `next` is allowed.
    ///
    /// `Submitting -> InProgress` is the single backward edge: a failed submit
    /// hands the attempt back to the learner while time remains.
    #[must_use]
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        use AttemptStatus::{Expired, InProgress, NotStarted, Submitted, Submitting};
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (InProgress, Submitting | Expired)
                | (Submitting, Submitted | Expired | InProgress)
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttemptStatus::NotStarted => "NOT_STARTED",
            AttemptStatus::InProgress => "IN_PROGRESS",
            AttemptStatus::Submitting => "SUBMITTING",
            AttemptStatus::Submitted => "SUBMITTED",
            AttemptStatus::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

//
// ─── RESULT ───────────────────────────────────────────────────────────────────
//

/// Grading outcome returned by the authority for a submitted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub score: f64,
    pub passed: bool,
    pub correct_answers: u32,
    pub total_questions: u32,
    #[serde(default)]
    pub expired: bool,
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// Attempt metadata issued by the authority when an attempt opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptGrant {
    pub attempt_id: AttemptId,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_limit_seconds: u32,
    pub total_questions: u32,
}

/// A single quiz attempt with its buffered answers.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    quiz_id: QuizId,
    grant: Option<AttemptGrant>,
    answers: BTreeMap<QuestionId, Vec<OptionId>>,
    status: AttemptStatus,
    result: Option<AttemptResult>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(quiz_id: QuizId) -> Self {
        Self {
            quiz_id,
            grant: None,
            answers: BTreeMap::new(),
            status: AttemptStatus::NotStarted,
            result: None,
        }
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.grant.as_ref().map(|grant| grant.attempt_id)
    }

    #[must_use]
    pub fn grant(&self) -> Option<&AttemptGrant> {
        self.grant.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&AttemptResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Vec<OptionId>> {
        &self.answers
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    fn transition(&mut self, next: AttemptStatus) -> Result<(), AttemptError> {
        if !self.status.can_transition_to(next) {
            return Err(AttemptError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Open the attempt with the metadata granted by the authority.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless the attempt has not started.
    pub fn begin(&mut self, grant: AttemptGrant) -> Result<(), AttemptError> {
        self.transition(AttemptStatus::InProgress)?;
        self.grant = Some(grant);
        Ok(())
    }

    /// Record the selected option for a question; the last write wins.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotInProgress` outside `InProgress`.
    pub fn select_answer(
        &mut self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<(), AttemptError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptError::NotInProgress(self.status));
        }
        self.answers.insert(question_id, vec![option_id]);
        Ok(())
    }

    /// Answer buffer in question order, ready to be serialized.
    #[must_use]
    pub fn answer_sheet(&self) -> Vec<(QuestionId, Vec<OptionId>)> {
        self.answers
            .iter()
            .map(|(question, options)| (*question, options.clone()))
            .collect()
    }

    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless the attempt is in progress.
    pub fn begin_submit(&mut self) -> Result<(), AttemptError> {
        self.transition(AttemptStatus::Submitting)
    }

    /// Store the grading result and settle the attempt.
    ///
    /// An authority-reported expiry lands in `Expired`, otherwise `Submitted`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless a submit is in flight.
    pub fn finish_submit(&mut self, result: AttemptResult) -> Result<AttemptStatus, AttemptError> {
        let next = if result.expired {
            AttemptStatus::Expired
        } else {
            AttemptStatus::Submitted
        };
        self.transition(next)?;
        self.result = Some(result);
        Ok(next)
    }

    /// Settle a failed submit: back to `InProgress` while time remains,
    /// otherwise `Expired`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless a submit is in flight.
    pub fn fail_submit(&mut self, time_remaining: bool) -> Result<AttemptStatus, AttemptError> {
        let next = if time_remaining {
            AttemptStatus::InProgress
        } else {
            AttemptStatus::Expired
        };
        self.transition(next)?;
        Ok(next)
    }
}

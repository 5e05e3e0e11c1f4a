//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{AttemptError, AttemptStatus};
use remote::RemoteError;

/// Errors emitted by `QuizAttemptEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("attempt already started (status: {0})")]
    AlreadyStarted(AttemptStatus),
    #[error("attempt could not be opened")]
    Start(#[source] RemoteError),
    #[error("submission failed; attempt is now {status}")]
    Submit {
        #[source]
        source: RemoteError,
        status: AttemptStatus,
    },
    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

/// Errors emitted by `CodingExercise`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodingError {
    #[error("submission source is empty")]
    EmptySource,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors emitted while reading `TrackerConfig`.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("seek tolerance ({tolerance}s) must exceed the poll interval ({poll}s)")]
    ToleranceTooSmall { tolerance: f64, poll: f64 },
}

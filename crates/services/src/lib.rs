#![forbid(unsafe_code)]

pub mod coding;
pub mod completion;
pub mod config;
pub mod error;
mod guard;
pub mod quiz_engine;
pub mod seek_monitor;
pub mod sessions;
pub mod task;

pub use course_core::Clock;

pub use coding::{CodingExercise, CodingOutcome};
pub use completion::{CompletionCallback, CompletionGate, ignore_completion};
pub use config::TrackerConfig;
pub use error::{CodingError, ConfigError, QuizError};
pub use quiz_engine::{AttemptSnapshot, QuizAttemptEngine, SubmitOutcome};
pub use seek_monitor::{MediaPositionSource, SeekMonitor};
pub use sessions::{LessonHandle, LessonSnapshot, ProgressSessionManager};
pub use task::ScheduledTask;

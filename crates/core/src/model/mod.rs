mod attempt;
mod ids;
mod lesson;
mod progress;

pub use ids::{AttemptId, LessonId, OptionId, ParseIdError, QuestionId, QuizId, SectionId, SessionKey};

pub use attempt::{AttemptError, AttemptGrant, AttemptResult, AttemptStatus, QuizAttempt};
pub use lesson::{LessonError, LessonRef, LessonType, Section, TrackingPolicy};
pub use progress::{LessonProgress, LessonProgressState, ProgressError};

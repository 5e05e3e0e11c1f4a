mod lesson;
mod manager;

// Public API of the lesson session subsystem.
pub use lesson::{LessonHandle, LessonSnapshot};
pub use manager::ProgressSessionManager;

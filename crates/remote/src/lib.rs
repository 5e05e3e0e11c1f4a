#![forbid(unsafe_code)]

//! Boundary to the remote progress authority.

pub mod client;
pub mod dto;
pub mod error;
pub mod http;
pub mod memory;

pub use client::{CodeSubmissionClient, ProgressSessionClient, QuizAttemptClient};
pub use error::RemoteError;
pub use http::{HttpAuthority, HttpAuthorityConfig};
pub use memory::{Endpoint, ExerciseDefinition, InMemoryAuthority, QuizDefinition};

//! `courseforge-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod course;
pub mod error;
pub mod id;

pub use course::{CourseArtifact, CourseDifficulty, CourseSpec};
pub use error::{DomainError, DomainResult};
pub use id::{GenerationId, UserId};

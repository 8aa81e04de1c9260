//! Typed request/result contracts for course generation.
//!
//! The queue boundary takes a structured [`CourseSpec`] rather than a raw
//! JSON blob; anything the generation service accepts beyond these fields
//! rides along in `extra` untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};

/// Target audience level for a generated course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseDifficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseDifficulty::Beginner => "beginner",
            CourseDifficulty::Intermediate => "intermediate",
            CourseDifficulty::Advanced => "advanced",
        }
    }
}

/// What to generate: the request contract forwarded to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSpec {
    /// Course title. Required, non-empty.
    pub title: String,
    /// Subject area (e.g. "mathematics").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Short description of the desired course.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: CourseDifficulty,
    /// Target number of modules, if the caller cares.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_count: Option<u8>,
    /// Free-form authoring instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Opaque passthrough for generator-specific options.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub extra: JsonValue,
}

impl CourseSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: None,
            description: None,
            difficulty: CourseDifficulty::default(),
            module_count: None,
            instructions: None,
            extra: JsonValue::Null,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: CourseDifficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_module_count(mut self, count: u8) -> Self {
        self.module_count = Some(count);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_extra(mut self, extra: JsonValue) -> Self {
        self.extra = extra;
        self
    }

    /// Validate the contract at the queue boundary.
    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("course title must not be empty"));
        }
        Ok(())
    }
}

/// What was generated: the result contract stored alongside a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseArtifact {
    /// The generated course document. Opaque to the queue; the marketplace
    /// layer owns its shape.
    pub course: JsonValue,
    /// Model that produced the course, if the generator reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl CourseArtifact {
    pub fn new(course: JsonValue) -> Self {
        Self {
            course,
            model: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_title() {
        assert!(CourseSpec::new("Algebra Basics").validate().is_ok());
        assert!(CourseSpec::new("   ").validate().is_err());
        assert!(CourseSpec::new("").validate().is_err());
    }

    #[test]
    fn spec_serializes_without_empty_options() {
        let spec = CourseSpec::new("Algebra Basics");
        let json = serde_json::to_value(&spec).unwrap();

        assert_eq!(json["title"], "Algebra Basics");
        assert_eq!(json["difficulty"], "beginner");
        assert!(json.get("subject").is_none());
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn spec_round_trips() {
        let spec = CourseSpec::new("Linear Algebra")
            .with_subject("mathematics")
            .with_difficulty(CourseDifficulty::Advanced)
            .with_module_count(8)
            .with_extra(serde_json::json!({"language": "en"}));

        let json = serde_json::to_string(&spec).unwrap();
        let back: CourseSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}

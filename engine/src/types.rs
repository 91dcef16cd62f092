//! Core Data Model
//!
//! Entities produced and consumed by the pipeline stages. Each entity is
//! produced by exactly one stage and read-only afterwards. Wire field names
//! are camelCase to match the public API contract.

use serde::{Deserialize, Serialize};

/// Maximum accepted length of a role string, after trimming.
pub const MAX_ROLE_LEN: usize = 200;

/// The inbound request: where the user is and where they want to go.
///
/// Both roles must be non-empty after trimming and at most [`MAX_ROLE_LEN`]
/// characters; the orchestrator rejects anything else before touching a
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerQuery {
    /// User's current job title
    pub current_role: String,

    /// User's desired job title
    pub target_role: String,
}

impl CareerQuery {
    pub fn new(current_role: impl Into<String>, target_role: impl Into<String>) -> Self {
        Self {
            current_role: current_role.into(),
            target_role: target_role.into(),
        }
    }
}

/// A ranked knowledge document returned by semantic retrieval.
///
/// Ordering is by descending relevance and matters for prompt construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub title: String,
    pub description: String,
    pub category: String,
}

/// A single course recommendation for a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseResult {
    pub skill: String,
    pub title: String,
    pub url: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// A runnable code example for the top skill. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub skill: String,
    pub language: String,
    pub code: String,
    pub description: String,
}

/// Outcome of executing a snippet in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Success,
    Failure,
}

/// Result of sandboxed execution, attached to the generated snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub status: ValidationStatus,

    /// Captured stdout
    pub output: String,

    /// Captured stderr or failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_seconds: f64,
}

impl ValidationResult {
    /// Fallback result used when the sandbox could not run the snippet at all.
    /// Validation is best-effort observability, never a gate on the response.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Failure,
            output: String::new(),
            error: Some(detail.into()),
            execution_time_seconds: 0.0,
        }
    }
}

/// One skill with its recommended courses. The generated code snippet rides
/// along on the first (highest-priority) skill only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillWithCourses {
    pub skill: String,
    pub courses: Vec<CourseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<CodeSnippet>,
}

/// The assembled response. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerPath {
    pub title: String,
    pub skills_to_learn: Vec<String>,
    pub skills_with_courses: Vec<SkillWithCourses>,
    pub code_validation_result: ValidationResult,
}

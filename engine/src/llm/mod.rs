//! Reasoning Client Abstraction
//!
//! Defines the contract for the LLM collaborator that identifies skill gaps
//! and writes example snippets. The provider may answer an analysis request
//! either with a final ordered skill list or with a single tool-call request
//! (course search); the tagged [`AnalysisTurn`] enum lets the orchestrator
//! pattern-match on the two shapes instead of sniffing response bodies.

use crate::types::{CareerQuery, KnowledgeSnippet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod friendli;

/// Result type for reasoning operations
pub type Result<T> = std::result::Result<T, ReasoningError>;

/// Errors that can occur while talking to the reasoning collaborator
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// Tool call id, set on tool result messages only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model mid-completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned identifier for this call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a raw JSON string, exactly as the model emitted them
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Outcome of one analysis turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisTurn {
    /// The model answered directly with an ordered skill list (at most 3)
    Skills(Vec<String>),

    /// The model wants course-search results before answering
    ToolCall(ToolCallRequest),
}

/// Reasoning collaborator contract
///
/// `analyze` opens the turn; when it returns [`AnalysisTurn::ToolCall`] the
/// orchestrator executes the tool and calls `resume` exactly once with the
/// result — a single bounded round, not an open-ended agent loop.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Identify the skill gap between the two roles, given retrieved context.
    async fn analyze(
        &self,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
    ) -> Result<AnalysisTurn>;

    /// Feed a tool result back into the turn opened by `analyze` and accept
    /// only a final skill list.
    async fn resume(
        &self,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
        call: &ToolCallRequest,
        tool_output: &str,
    ) -> Result<Vec<String>>;

    /// Generate a short commented runnable example for one skill.
    /// `strict` tightens the prompt after a safety-filter rejection.
    async fn generate_snippet(&self, skill: &str, language: &str, strict: bool) -> Result<String>;

    /// Check if the provider is currently reachable. Default implementation
    /// returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the analysis prompt from the role pair and retrieved context.
///
/// Snippet order is preserved: retrieval returns documents ranked by
/// descending relevance and the model sees them in that order.
pub fn build_analysis_messages(
    query: &CareerQuery,
    snippets: &[KnowledgeSnippet],
) -> Vec<Message> {
    let knowledge_text = if snippets.is_empty() {
        "No specific knowledge documents available.".to_string()
    } else {
        snippets
            .iter()
            .map(|s| format!("**{}** ({})\n{}", s.title, s.category, s.description))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    vec![
        Message::system(
            "You are a career advisor AI helping developers transition between roles. \
             Your task is to analyze career transitions and identify the most important \
             skills needed.",
        ),
        Message::user(format!(
            "Current Role: {current}\n\
             Target Role: {target}\n\n\
             Based on the following knowledge about the target role:\n\n\
             {knowledge}\n\n\
             Identify the top 3 most important skills this person needs to learn to \
             successfully transition from their current role to the target role.\n\n\
             Return your response as a JSON array of exactly 3 skill names. Format:\n\
             [\"Skill 1\", \"Skill 2\", \"Skill 3\"]\n\n\
             Only return the JSON array, nothing else.",
            current = query.current_role,
            target = query.target_role,
            knowledge = knowledge_text,
        )),
    ]
}

/// Build the code-generation prompt for one skill.
pub fn build_snippet_messages(skill: &str, language: &str, strict: bool) -> Vec<Message> {
    let mut requirements = format!(
        "Generate a short, functional code snippet (5-10 lines) demonstrating the skill: {skill}.\n\n\
         Requirements:\n\
         - Use {language} programming language\n\
         - Include 2-3 explanatory comments\n\
         - Make it a complete, runnable example\n\
         - Keep it simple and educational\n\
         - Focus on the core concept of {skill}\n\
         - Do NOT use file operations, network calls, or system commands\n"
    );
    if strict {
        requirements.push_str(
            "- Do NOT import any module or library at all\n\
             - Use only plain variables, collections, arithmetic, and print output\n",
        );
    }
    requirements.push_str("\nReturn only the code snippet with comments, no additional explanation.");

    vec![
        Message::system(
            "You are an expert programming instructor. Generate clean, educational code \
             examples that demonstrate core concepts. Always include explanatory comments.",
        ),
        Message::user(requirements),
    ]
}

/// Parse a skill list out of model output.
///
/// The model is told to emit a bare JSON array, but real completions wrap it
/// in prose or markdown, so this scans for the first `[` and last `]`.
/// The list is truncated to 3 entries; fewer than 3 is accepted as-is, but an
/// empty list is a parse error.
pub fn parse_skill_list(content: &str) -> Result<Vec<String>> {
    let trimmed = content.trim();

    let start = trimmed
        .find('[')
        .ok_or_else(|| ReasoningError::ParseError("No JSON array found in response".to_string()))?;
    let end = trimmed
        .rfind(']')
        .ok_or_else(|| ReasoningError::ParseError("Unterminated JSON array in response".to_string()))?;
    if end < start {
        return Err(ReasoningError::ParseError(
            "Malformed JSON array in response".to_string(),
        ));
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| ReasoningError::ParseError(format!("Invalid JSON in response: {}", e)))?;

    let mut skills: Vec<String> = values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect();

    skills.truncate(3);

    if skills.is_empty() {
        return Err(ReasoningError::ParseError(
            "Model returned no skills".to_string(),
        ));
    }

    Ok(skills)
}

/// Strip a markdown code fence from generated snippet output, if present.
///
/// Works even when there is prose before the opening fence or after the
/// closing one. Returns the input unchanged when no fence is found.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();

    let Some(fence_start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_opening = &trimmed[fence_start + 3..];

    // Skip the language tag line (e.g. "python\n")
    let Some(newline) = after_opening.find('\n') else {
        return trimmed.to_string();
    };
    let body = &after_opening[newline + 1..];

    match body.find("```") {
        Some(closing) => body[..closing].trim().to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skill_list_bare_array() {
        let skills =
            parse_skill_list(r#"["Python", "ML Fundamentals", "Data Structures"]"#).unwrap();
        assert_eq!(skills, vec!["Python", "ML Fundamentals", "Data Structures"]);
    }

    #[test]
    fn test_parse_skill_list_with_surrounding_prose() {
        let content = r#"Here are the skills:
["Python", "Statistics", "TensorFlow"]
Good luck!"#;
        let skills = parse_skill_list(content).unwrap();
        assert_eq!(skills, vec!["Python", "Statistics", "TensorFlow"]);
    }

    #[test]
    fn test_parse_skill_list_truncates_to_three() {
        let skills = parse_skill_list(r#"["A", "B", "C", "D", "E"]"#).unwrap();
        assert_eq!(skills, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_parse_skill_list_accepts_fewer_than_three() {
        let skills = parse_skill_list(r#"["Kubernetes"]"#).unwrap();
        assert_eq!(skills, vec!["Kubernetes"]);
    }

    #[test]
    fn test_parse_skill_list_rejects_empty_and_garbage() {
        assert!(parse_skill_list("[]").is_err());
        assert!(parse_skill_list("no array here").is_err());
        assert!(parse_skill_list("[not json").is_err());
    }

    #[test]
    fn test_strip_code_fences_with_language_tag() {
        let content = "```python\nprint('hi')\n```";
        assert_eq!(strip_code_fences(content), "print('hi')");
    }

    #[test]
    fn test_strip_code_fences_with_trailing_prose() {
        let content = "Here you go:\n```python\nx = 1\nprint(x)\n```\nEnjoy!";
        assert_eq!(strip_code_fences(content), "x = 1\nprint(x)");
    }

    #[test]
    fn test_strip_code_fences_passthrough_without_fence() {
        assert_eq!(strip_code_fences("  x = 1  "), "x = 1");
    }

    #[test]
    fn test_analysis_prompt_preserves_snippet_order() {
        let query = CareerQuery::new("Frontend Developer", "Machine Learning Engineer");
        let snippets = vec![
            KnowledgeSnippet {
                title: "First".to_string(),
                description: "most relevant".to_string(),
                category: "Skills".to_string(),
            },
            KnowledgeSnippet {
                title: "Second".to_string(),
                description: "less relevant".to_string(),
                category: "Skills".to_string(),
            },
        ];
        let messages = build_analysis_messages(&query, &snippets);
        assert_eq!(messages.len(), 2);
        let user = &messages[1].content;
        let first = user.find("**First**").unwrap();
        let second = user.find("**Second**").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_analysis_prompt_empty_context_placeholder() {
        let query = CareerQuery::new("A", "B");
        let messages = build_analysis_messages(&query, &[]);
        assert!(messages[1]
            .content
            .contains("No specific knowledge documents available."));
    }

    #[test]
    fn test_strict_snippet_prompt_forbids_imports() {
        let relaxed = build_snippet_messages("Python", "python", false);
        let strict = build_snippet_messages("Python", "python", true);
        assert!(!relaxed[1].content.contains("Do NOT import"));
        assert!(strict[1].content.contains("Do NOT import"));
    }
}

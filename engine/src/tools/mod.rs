//! Course Search Tool Gateway
//!
//! Executes the course-search tool against the external tool gateway and
//! parses its results into [`CourseResult`] values. The gateway is also the
//! source of the function schema the reasoning model is allowed to call.

use crate::config::ToolsConfig;
use crate::types::CourseResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const COURSE_SEARCH_TOOL: &str = "search_learning_content";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Tool gateway authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool call timed out")]
    Timeout,

    #[error("Failed to parse tool response: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// JSON function schema for the course-search tool, in the shape the
/// chat-completion API expects under `tools`.
pub fn course_search_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": COURSE_SEARCH_TOOL,
            "description": "Search for online courses and learning content for a specific skill",
            "parameters": {
                "type": "object",
                "properties": {
                    "skill": {
                        "type": "string",
                        "description": "The skill to find learning content for",
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "default": 5,
                    },
                },
                "required": ["skill"],
            },
        },
    })
}

/// Arguments payload for a course-search invocation.
pub fn course_args(skill: &str, max_results: usize) -> Value {
    json!({ "skill": skill, "max_results": max_results })
}

/// Abstract tool gateway. The orchestrator only ever asks for courses by
/// skill; the reasoning model may additionally route one call through
/// [`ToolGateway::execute`] mid-analysis.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Execute a named tool with JSON arguments, returning the raw JSON
    /// result. Unknown tool names fail with [`ToolError::UnknownTool`].
    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value>;

    /// Fetch courses for one skill, capped at `max_results`.
    async fn search_courses(&self, skill: &str, max_results: usize) -> Result<Vec<CourseResult>>;
}

#[derive(Debug, Deserialize)]
struct WireCourse {
    title: String,
    url: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse a raw tool result into typed courses for one skill.
///
/// Gateways differ in whether the list sits at the top level or under a
/// "results" key; malformed entries are skipped.
pub fn parse_course_list(skill: &str, data: &Value) -> Vec<CourseResult> {
    let list = data
        .get("results")
        .and_then(|r| r.as_array())
        .or_else(|| data.as_array());

    let Some(list) = list else {
        tracing::warn!(skill, "Tool result had no course list");
        return Vec::new();
    };

    list.iter()
        .filter_map(|item| serde_json::from_value::<WireCourse>(item.clone()).ok())
        .map(|c| CourseResult {
            skill: skill.to_string(),
            title: c.title,
            url: c.url,
            platform: c.platform.unwrap_or_else(|| "Unknown".to_string()),
            duration: c.duration,
            level: c.level,
        })
        .collect()
}

/// HTTP client for the tool gateway service.
pub struct HttpToolGateway {
    config: ToolsConfig,
    client: reqwest::Client,
}

impl HttpToolGateway {
    pub fn new(config: ToolsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolError::GatewayUnavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn execute_url(&self) -> String {
        format!("{}/v1/tools/execute", self.config.base_url)
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value> {
        if tool_name != COURSE_SEARCH_TOOL {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        }

        let payload = json!({
            "tool_name": tool_name,
            "arguments": arguments,
        });

        let mut request = self.client.post(self.execute_url()).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout
            } else {
                ToolError::GatewayUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::AuthenticationFailed(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ParseError(e.to_string()))?;

        if parsed.success == Some(false) {
            return Err(ToolError::ExecutionFailed(
                parsed.error.unwrap_or_else(|| "unknown failure".to_string()),
            ));
        }

        Ok(parsed.data.unwrap_or(Value::Null))
    }

    async fn search_courses(&self, skill: &str, max_results: usize) -> Result<Vec<CourseResult>> {
        tracing::debug!(skill, max_results, "Searching learning content");

        let data = self
            .execute(COURSE_SEARCH_TOOL, &course_args(skill, max_results))
            .await?;

        let mut courses = parse_course_list(skill, &data);
        courses.truncate(max_results);
        tracing::info!(skill, count = courses.len(), "Course search complete");
        Ok(courses)
    }
}

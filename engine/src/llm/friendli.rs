//! FriendliAI Reasoning Client
//!
//! OpenAI-compatible chat-completion client for the reasoning collaborator.
//! The analysis turn advertises the course-search tool with
//! `tool_choice: auto`; at most one tool call is accepted per turn.

use super::{
    build_analysis_messages, build_snippet_messages, parse_skill_list, strip_code_fences,
    AnalysisTurn, Message, ReasoningClient, ReasoningError, Result, ToolCallRequest,
};
use crate::config::ReasoningConfig;
use crate::tools::course_search_schema;
use crate::types::{CareerQuery, KnowledgeSnippet};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub struct FriendliClient {
    config: ReasoningConfig,
    client: reqwest::Client,
}

impl FriendliClient {
    pub fn new(config: ReasoningConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::NetworkError(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_api_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match &m.tool_call_id {
                Some(id) => json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                    "tool_call_id": id,
                }),
                None => json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                }),
            })
            .collect()
    }

    async fn chat(&self, payload: Value) -> Result<Value> {
        let mut request = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&payload);

        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| ReasoningError::ParseError(e.to_string()))
    }

    /// Pull `choices[0].message` out of a completion response.
    fn first_message(data: &Value) -> Result<&Value> {
        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| ReasoningError::ParseError("No choices in response".to_string()))
    }

    fn extract_tool_call(message: &Value) -> Option<ToolCallRequest> {
        let call = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .and_then(|t| t.first())?;
        let function = call.get("function")?;
        Some(ToolCallRequest::new(
            call.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
            function.get("name").and_then(|v| v.as_str())?,
            function
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}"),
        ))
    }

    fn extract_content(message: &Value) -> Result<&str> {
        message
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ReasoningError::ParseError("Empty content in response".to_string()))
    }
}

#[async_trait]
impl ReasoningClient for FriendliClient {
    async fn analyze(
        &self,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
    ) -> Result<AnalysisTurn> {
        let messages = build_analysis_messages(query, snippets);

        let payload = json!({
            "model": self.config.model,
            "messages": Self::to_api_messages(&messages),
            "temperature": 0.7,
            "max_tokens": 1000,
            "tools": [course_search_schema()],
            "tool_choice": "auto",
        });

        tracing::debug!(
            model = %self.config.model,
            current = %query.current_role,
            target = %query.target_role,
            "Sending skill gap analysis request"
        );

        let data = self.chat(payload).await?;
        let message = Self::first_message(&data)?;

        if let Some(call) = Self::extract_tool_call(message) {
            tracing::info!(tool = %call.name, "Model requested a tool call");
            return Ok(AnalysisTurn::ToolCall(call));
        }

        let content = Self::extract_content(message)?;
        Ok(AnalysisTurn::Skills(parse_skill_list(content)?))
    }

    async fn resume(
        &self,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
        call: &ToolCallRequest,
        tool_output: &str,
    ) -> Result<Vec<String>> {
        let mut api_messages = Self::to_api_messages(&build_analysis_messages(query, snippets));

        // Replay the model's tool call, then hand it the result. No tools are
        // advertised on the resume request, so the turn must close with a
        // final answer.
        api_messages.push(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments },
            }],
        }));
        api_messages.extend(Self::to_api_messages(&[Message::tool_result(
            tool_output,
            &call.id,
        )]));

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": 0.7,
            "max_tokens": 500,
        });

        let data = self.chat(payload).await?;
        let message = Self::first_message(&data)?;
        let content = Self::extract_content(message)?;
        parse_skill_list(content)
    }

    async fn generate_snippet(&self, skill: &str, language: &str, strict: bool) -> Result<String> {
        let messages = build_snippet_messages(skill, language, strict);

        let payload = json!({
            "model": self.config.model,
            "messages": Self::to_api_messages(&messages),
            "temperature": 0.7,
            "max_tokens": 300,
        });

        tracing::debug!(skill, language, strict, "Requesting code snippet");

        let data = self.chat(payload).await?;
        let message = Self::first_message(&data)?;
        let content = Self::extract_content(message)?;
        Ok(strip_code_fences(content))
    }

    /// Hit the provider's model listing with the configured key. A missing
    /// key, transport failure, or non-success status all report unhealthy.
    async fn check_health(&self) -> bool {
        let Some(key) = &self.config.api_key else {
            return false;
        };

        let result = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .header("Authorization", format!("Bearer {}", key))
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Reasoning provider health check failed");
                false
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> ReasoningError {
    if e.is_timeout() {
        ReasoningError::Timeout
    } else if e.is_connect() {
        ReasoningError::ProviderUnavailable(e.to_string())
    } else {
        ReasoningError::NetworkError(e.to_string())
    }
}

fn map_status_error(status: u16, body: String) -> ReasoningError {
    match status {
        401 | 403 => ReasoningError::AuthenticationFailed(body),
        429 => ReasoningError::RateLimitExceeded,
        408 | 504 => ReasoningError::Timeout,
        _ => ReasoningError::InvalidRequest(format!("status {}: {}", status, body)),
    }
}

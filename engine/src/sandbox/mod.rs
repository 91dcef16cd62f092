//! Isolated Code Execution Sandbox
//!
//! Runs a generated snippet inside a disposable remote sandbox and reports a
//! [`ValidationResult`]. The sandbox lifecycle is provision, execute, destroy;
//! destroy happens exactly once on every path, including execution timeout
//! and task cancellation.

use crate::config::SandboxConfig;
use crate::types::{CodeSnippet, ValidationResult, ValidationStatus};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Sandbox service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Sandbox authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Failed to provision sandbox: {0}")]
    ProvisionFailed(String),

    #[error("Sandbox execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to parse sandbox response: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// File name the snippet is written to before execution.
pub fn entrypoint_for(language: &str) -> &'static str {
    match language {
        "javascript" => "index.js",
        "java" => "Main.java",
        "sql" => "query.sql",
        _ => "main.py",
    }
}

/// Abstract code validator.
#[async_trait]
pub trait SandboxValidator: Send + Sync {
    /// Execute a snippet in isolation and report the outcome. An `Err` here
    /// means the sandbox itself was unusable; an unsafe or broken snippet is
    /// an `Ok` with [`ValidationStatus::Failure`].
    async fn validate(&self, snippet: &CodeSnippet) -> Result<ValidationResult>;
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExecResponse {
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

/// HTTP client for the remote sandbox service.
pub struct HttpSandbox {
    config: SandboxConfig,
    client: reqwest::Client,
}

/// Owns a provisioned sandbox and guarantees its destruction.
///
/// `teardown` is called explicitly on every normal path. If the future
/// driving validation is dropped mid-flight, `Drop` spawns a detached delete
/// so the remote sandbox is not leaked.
struct SandboxGuard {
    id: String,
    client: reqwest::Client,
    delete_url: String,
    api_key: Option<String>,
    torn_down: bool,
}

impl SandboxGuard {
    async fn teardown(mut self) {
        self.torn_down = true;
        let request = authed(
            self.client.delete(&self.delete_url),
            self.api_key.as_deref(),
        );
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Sandbox destroyed");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Sandbox delete returned an error");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to destroy sandbox");
            }
        }
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        let request = authed(
            self.client.delete(&self.delete_url),
            self.api_key.as_deref(),
        );
        tracing::warn!("Sandbox guard dropped without teardown, deleting in background");
        tokio::spawn(async move {
            let _ = request.send().await;
        });
    }
}

fn authed(builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
        None => builder,
    }
}

impl HttpSandbox {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Give the HTTP layer headroom beyond the execution deadline; the
            // hard cutoff is enforced with tokio::time::timeout below.
            .timeout(Duration::from_secs(config.timeout_secs + 10))
            .build()
            .map_err(|e| SandboxError::ServiceUnavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn create_url(&self) -> String {
        format!("{}/api/sandboxes", self.config.base_url)
    }

    fn exec_url(&self, id: &str) -> String {
        format!("{}/api/sandboxes/{}/exec", self.config.base_url, id)
    }

    fn delete_url(&self, id: &str) -> String {
        format!("{}/api/sandboxes/{}", self.config.base_url, id)
    }

    /// Provision a sandbox, retrying transient failures with a short backoff.
    /// Authentication failures are terminal and never retried.
    async fn provision(&self) -> Result<SandboxGuard> {
        let mut last_error = None;

        for attempt in 0..=self.config.provision_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                tracing::info!(attempt, "Retrying sandbox provisioning");
            }

            let request = authed(
                self.client.post(self.create_url()),
                self.config.api_key.as_deref(),
            );
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        let body = response.text().await.unwrap_or_default();
                        return Err(SandboxError::AuthenticationFailed(body));
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(SandboxError::ProvisionFailed(format!(
                            "status {}: {}",
                            status, body
                        )));
                        continue;
                    }
                    let created: CreateResponse = response
                        .json()
                        .await
                        .map_err(|e| SandboxError::ParseError(e.to_string()))?;
                    tracing::debug!(sandbox_id = %created.id, "Sandbox provisioned");
                    return Ok(SandboxGuard {
                        delete_url: self.delete_url(&created.id),
                        id: created.id,
                        client: self.client.clone(),
                        api_key: self.config.api_key.clone(),
                        torn_down: false,
                    });
                }
                Err(e) => {
                    last_error = Some(SandboxError::ServiceUnavailable(e.to_string()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SandboxError::ProvisionFailed("no attempts made".to_string())))
    }

    async fn execute(&self, exec_url: &str, snippet: &CodeSnippet) -> Result<ExecResponse> {
        let payload = json!({
            "language": snippet.language,
            "entrypoint": entrypoint_for(&snippet.language),
            "code": snippet.code,
        });

        let request = authed(
            self.client.post(exec_url).json(&payload),
            self.config.api_key.as_deref(),
        );
        let response = request
            .send()
            .await
            .map_err(|e| SandboxError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::ExecutionFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SandboxError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl SandboxValidator for HttpSandbox {
    async fn validate(&self, snippet: &CodeSnippet) -> Result<ValidationResult> {
        let guard = self.provision().await?;
        let exec_url = self.exec_url(&guard.id);

        let started = Instant::now();
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let outcome = tokio::time::timeout(deadline, self.execute(&exec_url, snippet)).await;
        let elapsed = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(Ok(exec)) => {
                let status = if exec.exit_code == 0 {
                    ValidationStatus::Success
                } else {
                    ValidationStatus::Failure
                };
                tracing::info!(
                    skill = %snippet.skill,
                    exit_code = exec.exit_code,
                    elapsed_secs = elapsed,
                    "Snippet execution finished"
                );
                Ok(ValidationResult {
                    status,
                    output: exec.stdout,
                    error: (!exec.stderr.is_empty()).then_some(exec.stderr),
                    execution_time_seconds: elapsed,
                })
            }
            Ok(Err(SandboxError::ParseError(detail))) => {
                // A sandbox that answers with garbage still counts as having
                // run; report it as unavailable rather than failing the stage.
                tracing::warn!(detail = %detail, "Sandbox returned a malformed exec response");
                Ok(ValidationResult::unavailable(&format!(
                    "Malformed sandbox response: {}",
                    detail
                )))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    skill = %snippet.skill,
                    timeout_secs = self.config.timeout_secs,
                    "Snippet execution hit the hard timeout"
                );
                Ok(ValidationResult {
                    status: ValidationStatus::Failure,
                    output: String::new(),
                    error: Some(format!(
                        "Code execution timed out after {} seconds",
                        self.config.timeout_secs
                    )),
                    execution_time_seconds: elapsed,
                })
            }
        };

        guard.teardown().await;
        result
    }
}

//! Career Path Orchestrator
//!
//! Drives the six-stage pipeline: retrieve knowledge, analyze the skill gap,
//! fetch courses, generate a code example, validate it in the sandbox, and
//! assemble the [`CareerPath`] response. Each stage has its own failure
//! policy; only validation failure and reasoning failure abort a request,
//! everything else degrades.

use crate::config::Config;
use crate::llm::{AnalysisTurn, ReasoningClient, ToolCallRequest};
use crate::retrieval::{KnowledgeRetriever, RetrievalError};
use crate::safety::{detect_language, fallback_snippet, SafetyFilter};
use crate::sandbox::SandboxValidator;
use crate::tools::{parse_course_list, ToolError, ToolGateway, COURSE_SEARCH_TOOL};
use crate::trace::{SpanErrorKind, TraceRecorder, TraceSpan};
use crate::types::{
    CareerPath, CareerQuery, CodeSnippet, CourseResult, KnowledgeSnippet, SkillWithCourses,
    ValidationResult, MAX_ROLE_LEN,
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;

/// Errors surfaced to the caller. Degradable stage failures never reach
/// here; they are absorbed per stage policy.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Skill analysis failed: {0}")]
    Analysis(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Stable machine-readable kind for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation_error",
            OrchestratorError::Analysis(_) => "analysis_error",
            OrchestratorError::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Reachability report for the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub retrieval: bool,
    pub reasoning: bool,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.retrieval && self.reasoning
    }
}

/// The pipeline driver. Collaborators are trait objects so tests can swap
/// any of them for a scripted double.
pub struct Orchestrator {
    retriever: Arc<dyn KnowledgeRetriever>,
    reasoner: Arc<dyn ReasoningClient>,
    tools: Arc<dyn ToolGateway>,
    sandbox: Arc<dyn SandboxValidator>,
    recorder: Arc<dyn TraceRecorder>,
    safety: SafetyFilter,
    max_courses_per_skill: usize,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<dyn KnowledgeRetriever>,
        reasoner: Arc<dyn ReasoningClient>,
        tools: Arc<dyn ToolGateway>,
        sandbox: Arc<dyn SandboxValidator>,
        recorder: Arc<dyn TraceRecorder>,
        config: &Config,
    ) -> Self {
        Self {
            retriever,
            reasoner,
            tools,
            sandbox,
            recorder,
            safety: SafetyFilter::new(),
            max_courses_per_skill: config.tools.max_courses_per_skill,
        }
    }

    /// Run the full pipeline for one request.
    pub async fn generate_career_path(&self, query: &CareerQuery) -> Result<CareerPath> {
        // Validation happens before any collaborator is touched and before a
        // trace is opened; a rejected request leaves no trace behind.
        let query = validate_query(query)?;

        tracing::info!(
            current = %query.current_role,
            target = %query.target_role,
            "Generating career path"
        );
        let trace_id = self.recorder.start_trace("career_path");

        let snippets = self.retrieve_stage(trace_id, &query).await;
        let analysis = match self.analyze_stage(trace_id, &query, &snippets).await {
            Ok(analysis) => analysis,
            Err(e) => {
                self.recorder.end_trace(trace_id, e.kind());
                return Err(e);
            }
        };
        let courses_per_skill = self.courses_stage(trace_id, &analysis).await;
        let code_snippet = self.generate_stage(trace_id, &analysis.skills[0]).await;
        let validation = self.validate_stage(trace_id, &code_snippet).await;

        let skills_with_courses = analysis
            .skills
            .iter()
            .zip(courses_per_skill)
            .enumerate()
            .map(|(i, (skill, courses))| SkillWithCourses {
                skill: skill.clone(),
                courses,
                code_snippet: (i == 0).then(|| code_snippet.clone()),
            })
            .collect();

        let path = CareerPath {
            title: format!(
                "Your Path from {} to {}",
                query.current_role, query.target_role
            ),
            skills_to_learn: analysis.skills,
            skills_with_courses,
            code_validation_result: validation,
        };

        self.recorder.end_trace(trace_id, "success");
        tracing::info!(skills = path.skills_to_learn.len(), "Career path assembled");
        Ok(path)
    }

    /// Reachability of the collaborators the health endpoint reports on.
    pub async fn health(&self) -> HealthReport {
        let (retrieval, reasoning) =
            tokio::join!(self.retriever.check_health(), self.reasoner.check_health());
        HealthReport {
            retrieval,
            reasoning,
        }
    }

    /// Stage 1: semantic retrieval. Best-effort; any failure degrades to an
    /// empty context.
    async fn retrieve_stage(
        &self,
        trace_id: uuid::Uuid,
        query: &CareerQuery,
    ) -> Vec<KnowledgeSnippet> {
        let started = Utc::now();

        let (snippets, error_kind) = match self.retriever.search(&query.target_role).await {
            Ok(snippets) if snippets.is_empty() => {
                tracing::info!("Semantic search matched nothing above the score floor");
                (Vec::new(), Some(SpanErrorKind::RetrievalEmpty))
            }
            Ok(snippets) => (snippets, None),
            Err(e) => {
                log_retrieval_failure(&e);
                (Vec::new(), Some(SpanErrorKind::RetrievalError))
            }
        };

        self.recorder.record_span(
            trace_id,
            TraceSpan::new(
                "retrieve",
                started,
                query.target_role.clone(),
                format!("{} snippets", snippets.len()),
                error_kind,
            ),
        );
        snippets
    }

    /// Stage 2: skill gap analysis, with at most one tool round. Fatal on
    /// failure.
    async fn analyze_stage(
        &self,
        trace_id: uuid::Uuid,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
    ) -> Result<Analysis> {
        let started = Utc::now();

        let outcome = self.run_analysis(query, snippets).await;
        let (result, output_summary, error_kind) = match outcome {
            Ok(analysis) => {
                let summary = format!("{} skills", analysis.skills.len());
                (Ok(analysis), summary, None)
            }
            Err(e) => (
                Err(e),
                "failed".to_string(),
                Some(SpanErrorKind::AnalysisError),
            ),
        };

        self.recorder.record_span(
            trace_id,
            TraceSpan::new(
                "analyze",
                started,
                format!("{} context snippets", snippets.len()),
                output_summary,
                error_kind,
            ),
        );
        result
    }

    async fn run_analysis(
        &self,
        query: &CareerQuery,
        snippets: &[KnowledgeSnippet],
    ) -> Result<Analysis> {
        let turn = self
            .reasoner
            .analyze(query, snippets)
            .await
            .map_err(|e| OrchestratorError::Analysis(e.to_string()))?;

        let (skills, prefetched) = match turn {
            AnalysisTurn::Skills(skills) => (skills, None),
            AnalysisTurn::ToolCall(call) => {
                let (tool_output, prefetched) = self.run_tool_round(&call).await?;
                let skills = self
                    .reasoner
                    .resume(query, snippets, &call, &tool_output)
                    .await
                    .map_err(|e| OrchestratorError::Analysis(e.to_string()))?;
                (skills, prefetched)
            }
        };

        let skills = dedup_preserving_order(skills);
        if skills.is_empty() {
            return Err(OrchestratorError::Analysis(
                "Analysis produced no skills".to_string(),
            ));
        }

        Ok(Analysis { skills, prefetched })
    }

    /// Execute the single tool call the model is allowed mid-analysis. An
    /// ordinary failure feeds an error payload back so the turn can still
    /// close; an unknown tool name is a contract violation and aborts.
    async fn run_tool_round(
        &self,
        call: &ToolCallRequest,
    ) -> Result<(String, Option<(String, Vec<CourseResult>)>)> {
        tracing::info!(tool = %call.name, "Executing mid-analysis tool call");

        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));

        match self.tools.execute(&call.name, &arguments).await {
            Ok(data) => {
                // When the model searched courses for a concrete skill, keep
                // the parsed results so the fan-out stage can reuse them. The
                // per-skill cap applies here the same as on the fetch path.
                let prefetched = (call.name == COURSE_SEARCH_TOOL)
                    .then(|| arguments.get("skill").and_then(|s| s.as_str()))
                    .flatten()
                    .map(|skill| {
                        let mut courses = parse_course_list(skill, &data);
                        courses.truncate(self.max_courses_per_skill);
                        (skill.to_string(), courses)
                    });
                Ok((data.to_string(), prefetched))
            }
            Err(ToolError::UnknownTool(name)) => {
                tracing::error!(tool = %name, "Reasoning model requested an unknown tool");
                Err(OrchestratorError::Internal(format!(
                    "Reasoning model requested unknown tool: {}",
                    name
                )))
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Mid-analysis tool call failed");
                Ok((json!({ "error": e.to_string() }).to_string(), None))
            }
        }
    }

    /// Stage 3: concurrent course fetch, one sub-query per skill. Results
    /// join back positionally; a failed fetch yields an empty list for that
    /// skill only.
    async fn courses_stage(
        &self,
        trace_id: uuid::Uuid,
        analysis: &Analysis,
    ) -> Vec<Vec<CourseResult>> {
        let started = Utc::now();

        let fetches = analysis.skills.iter().map(|skill| {
            let prefetched = analysis.prefetched_for(skill);
            async move {
                if let Some(courses) = prefetched {
                    tracing::debug!(skill, "Reusing courses from the analysis tool round");
                    return (courses, false);
                }
                match self
                    .tools
                    .search_courses(skill, self.max_courses_per_skill)
                    .await
                {
                    Ok(courses) => (courses, false),
                    Err(e) => {
                        tracing::warn!(skill, error = %e, "Course search failed for skill");
                        (Vec::new(), true)
                    }
                }
            }
        });

        let results = join_all(fetches).await;
        let any_failed = results.iter().any(|(_, failed)| *failed);
        let courses: Vec<Vec<CourseResult>> =
            results.into_iter().map(|(courses, _)| courses).collect();

        let total: usize = courses.iter().map(Vec::len).sum();
        self.recorder.record_span(
            trace_id,
            TraceSpan::new(
                "fetch_courses",
                started,
                format!("{} skills", analysis.skills.len()),
                format!("{} courses", total),
                any_failed.then_some(SpanErrorKind::ToolError),
            ),
        );
        courses
    }

    /// Stage 4: code generation for the top skill, with safety screening and
    /// one strict retry. Never fails; the deterministic fallback snippet is
    /// the floor.
    async fn generate_stage(&self, trace_id: uuid::Uuid, skill: &str) -> CodeSnippet {
        let started = Utc::now();
        let language = detect_language(skill);

        let (code, description, error_kind) = match self.generate_safe_code(skill, language).await {
            Ok(code) => (
                code,
                format!("Example code demonstrating {}", skill),
                None,
            ),
            Err(kind) => (
                fallback_snippet(language).to_string(),
                format!("A simple {} example", language),
                Some(kind),
            ),
        };

        self.recorder.record_span(
            trace_id,
            TraceSpan::new(
                "generate_code",
                started,
                skill.to_string(),
                format!("{} snippet, {} bytes", language, code.len()),
                error_kind,
            ),
        );

        CodeSnippet {
            skill: skill.to_string(),
            language: language.to_string(),
            code,
            description,
        }
    }

    async fn generate_safe_code(
        &self,
        skill: &str,
        language: &str,
    ) -> std::result::Result<String, SpanErrorKind> {
        let first = match self.reasoner.generate_snippet(skill, language, false).await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(skill, error = %e, "Snippet generation failed");
                return Err(SpanErrorKind::GenerationError);
            }
        };
        if self.safety.check(&first).is_ok() {
            return Ok(first);
        }

        tracing::info!(skill, "Generated code rejected, retrying with strict prompt");
        let second = match self.reasoner.generate_snippet(skill, language, true).await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(skill, error = %e, "Strict snippet generation failed");
                return Err(SpanErrorKind::GenerationError);
            }
        };
        match self.safety.check(&second) {
            Ok(()) => Ok(second),
            Err(rejection) => {
                tracing::warn!(skill, %rejection, "Strict retry rejected, using fallback");
                Err(SpanErrorKind::SafetyRejection)
            }
        }
    }

    /// Stage 5: sandboxed execution. An unusable sandbox degrades to an
    /// unavailable result rather than failing the request.
    async fn validate_stage(
        &self,
        trace_id: uuid::Uuid,
        snippet: &CodeSnippet,
    ) -> ValidationResult {
        let started = Utc::now();

        let (result, error_kind) = match self.sandbox.validate(snippet).await {
            Ok(result) => (result, None),
            Err(e) => {
                tracing::warn!(error = %e, "Sandbox unavailable, skipping validation");
                (
                    ValidationResult::unavailable(format!("Code validation unavailable: {}", e)),
                    Some(SpanErrorKind::SandboxError),
                )
            }
        };

        self.recorder.record_span(
            trace_id,
            TraceSpan::new(
                "validate",
                started,
                format!("{} snippet", snippet.language),
                format!("{:?}", result.status),
                error_kind,
            ),
        );
        result
    }
}

/// Output of the analysis stage: the deduplicated ordered skill list plus
/// any courses already fetched during the tool round.
struct Analysis {
    skills: Vec<String>,
    prefetched: Option<(String, Vec<CourseResult>)>,
}

impl Analysis {
    fn prefetched_for(&self, skill: &str) -> Option<Vec<CourseResult>> {
        self.prefetched
            .as_ref()
            .filter(|(s, _)| s.eq_ignore_ascii_case(skill))
            .map(|(_, courses)| courses.clone())
    }
}

fn log_retrieval_failure(e: &RetrievalError) {
    match e {
        RetrievalError::Timeout => {
            tracing::warn!("Semantic search timed out, continuing without context")
        }
        other => tracing::warn!(error = %other, "Semantic search failed, continuing without context"),
    }
}

/// Trim both roles and enforce the length bounds. Returns the normalized
/// query the rest of the pipeline sees.
fn validate_query(query: &CareerQuery) -> Result<CareerQuery> {
    let current = query.current_role.trim();
    let target = query.target_role.trim();

    if current.is_empty() {
        return Err(OrchestratorError::Validation(
            "currentRole must not be empty".to_string(),
        ));
    }
    if target.is_empty() {
        return Err(OrchestratorError::Validation(
            "targetRole must not be empty".to_string(),
        ));
    }
    if current.len() > MAX_ROLE_LEN {
        return Err(OrchestratorError::Validation(format!(
            "currentRole exceeds {} characters",
            MAX_ROLE_LEN
        )));
    }
    if target.len() > MAX_ROLE_LEN {
        return Err(OrchestratorError::Validation(format!(
            "targetRole exceeds {} characters",
            MAX_ROLE_LEN
        )));
    }

    Ok(CareerQuery::new(current, target))
}

/// Case-insensitive dedup that keeps first occurrences in order.
fn dedup_preserving_order(skills: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for skill in skills {
        let key = skill.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(skill);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_query_trims_roles() {
        let query = CareerQuery::new("  Frontend Developer  ", " ML Engineer ");
        let normalized = validate_query(&query).unwrap();
        assert_eq!(normalized.current_role, "Frontend Developer");
        assert_eq!(normalized.target_role, "ML Engineer");
    }

    #[test]
    fn test_validate_query_rejects_blank_roles() {
        assert!(validate_query(&CareerQuery::new("", "ML Engineer")).is_err());
        assert!(validate_query(&CareerQuery::new("   ", "ML Engineer")).is_err());
        assert!(validate_query(&CareerQuery::new("Dev", "\t")).is_err());
    }

    #[test]
    fn test_validate_query_rejects_oversized_roles() {
        let long = "x".repeat(MAX_ROLE_LEN + 1);
        let err = validate_query(&CareerQuery::new(long, "ML Engineer")).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_validate_query_accepts_max_length() {
        let exact = "x".repeat(MAX_ROLE_LEN);
        assert!(validate_query(&CareerQuery::new(exact, "ML Engineer")).is_ok());
    }

    #[test]
    fn test_dedup_preserves_first_occurrence_order() {
        let skills = vec![
            "Python".to_string(),
            "TensorFlow".to_string(),
            "python".to_string(),
        ];
        assert_eq!(dedup_preserving_order(skills), vec!["Python", "TensorFlow"]);
    }
}

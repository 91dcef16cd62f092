//! SkillPath API Server
//!
//! Exposes the career-path orchestrator over REST.
//!
//! # Endpoints
//!
//! - POST /api/generate-career-path - Run the full pipeline for a role pair
//! - GET /api/health - Reachability of the key collaborators
//! - GET / - Service banner

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use skillpath_engine::config::Config;
use skillpath_engine::llm::friendli::FriendliClient;
use skillpath_engine::orchestrator::{Orchestrator, OrchestratorError};
use skillpath_engine::retrieval::HttpRetriever;
use skillpath_engine::sandbox::HttpSandbox;
use skillpath_engine::tools::HttpToolGateway;
use skillpath_engine::trace::{HttpTraceRecorder, MemoryTraceRecorder, TraceRecorder};
use skillpath_engine::types::CareerQuery;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Error envelope returned for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub kind: &'static str,
    pub message: String,
}

/// Server state shared across handlers
#[derive(Clone)]
pub struct ServerState {
    orchestrator: Arc<Orchestrator>,
    request_timeout: Duration,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            request_timeout,
        }
    }
}

/// Wire the orchestrator from configuration, choosing the trace recorder by
/// whether an external sink endpoint is configured.
pub fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let retriever = Arc::new(HttpRetriever::new(config.retrieval.clone())?);
    let reasoner = Arc::new(FriendliClient::new(config.reasoning.clone())?);
    let tools = Arc::new(HttpToolGateway::new(config.tools.clone())?);
    let sandbox = Arc::new(HttpSandbox::new(config.sandbox.clone())?);

    let recorder: Arc<dyn TraceRecorder> = match &config.trace.endpoint {
        Some(endpoint) => Arc::new(HttpTraceRecorder::new(
            endpoint.clone(),
            config.trace.project.clone(),
            config.trace.api_key.clone(),
        )),
        None => Arc::new(MemoryTraceRecorder::new()),
    };

    Ok(Orchestrator::new(
        retriever, reasoner, tools, sandbox, recorder, config,
    ))
}

/// Build the router over the given state.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/generate-career-path", post(generate_handler))
        .route("/api/health", get(health_handler))
        .route("/", get(index_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: &Config, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = ServerState::new(
        Arc::new(orchestrator),
        Duration::from_secs(config.server.request_timeout_secs),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("SkillPath API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

async fn generate_handler(
    State(state): State<ServerState>,
    Json(query): Json<CareerQuery>,
) -> Response {
    // The parent deadline bounds the whole pipeline; when it fires, every
    // in-flight collaborator call is cancelled with the request future.
    let outcome = tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.generate_career_path(&query),
    )
    .await;

    match outcome {
        Ok(Ok(path)) => (StatusCode::OK, Json(path)).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(_) => {
            tracing::warn!(
                timeout_secs = state.request_timeout.as_secs(),
                "Request hit the overall deadline"
            );
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorEnvelope {
                    kind: "timeout_error",
                    message: format!(
                        "Request timed out after {} seconds",
                        state.request_timeout.as_secs()
                    ),
                }),
            )
                .into_response()
        }
    }
}

fn error_response(e: OrchestratorError) -> Response {
    let status = match &e {
        OrchestratorError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::Analysis(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let envelope = ErrorEnvelope {
        kind: e.kind(),
        message: e.to_string(),
    };
    (status, Json(envelope)).into_response()
}

async fn health_handler(State(state): State<ServerState>) -> Response {
    let report = state.orchestrator.health().await;
    let status = if report.all_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "components": report,
        })),
    )
        .into_response()
}

async fn index_handler() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "service": "SkillPath API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": ["/api/generate-career-path", "/api/health"],
        })),
    )
        .into_response()
}

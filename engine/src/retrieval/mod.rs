//! Semantic Knowledge Retrieval
//!
//! Queries the vector-search collaborator for role-transition knowledge
//! snippets. Retrieval is best-effort: any failure here degrades to an empty
//! snippet list upstream rather than failing the request.

use crate::config::RetrievalConfig;
use crate::types::KnowledgeSnippet;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Retrieval authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Retrieval query failed: {0}")]
    QueryFailed(String),

    #[error("Retrieval query timed out")]
    Timeout,

    #[error("Failed to parse retrieval response: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Abstract semantic retriever over a knowledge collection.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Run a similarity search. Results below the configured score floor are
    /// dropped and at most the configured limit is returned.
    async fn search(&self, query: &str) -> Result<Vec<KnowledgeSnippet>>;

    /// Whether the retrieval backend is reachable and ready.
    async fn check_health(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct WireSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WireSnippet>,
}

/// HTTP client for the vector-search service.
pub struct HttpRetriever {
    config: RetrievalConfig,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::ServiceUnavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn search_url(&self) -> String {
        format!("{}/v1/search", self.config.base_url)
    }

    fn ready_url(&self) -> String {
        format!("{}/v1/.well-known/ready", self.config.base_url)
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpRetriever {
    async fn search(&self, query: &str) -> Result<Vec<KnowledgeSnippet>> {
        let payload = json!({
            "collection": self.config.collection,
            "query": query,
            "limit": self.config.limit,
            "certainty": self.config.min_score,
        });

        tracing::debug!(
            collection = %self.config.collection,
            limit = self.config.limit,
            "Running semantic search"
        );

        let mut request = self.client.post(self.search_url()).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout
            } else {
                RetrievalError::ServiceUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::AuthenticationFailed(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::QueryFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::ParseError(e.to_string()))?;

        // The backend applies the certainty cutoff too, but re-filter here so
        // the floor holds for backends that ignore the hint.
        let min_score = self.config.min_score;
        let mut snippets: Vec<KnowledgeSnippet> = parsed
            .results
            .into_iter()
            .filter(|r| r.score.map_or(true, |s| s >= min_score))
            .map(|r| KnowledgeSnippet {
                title: r.title,
                description: r.description,
                category: r.category,
            })
            .collect();
        snippets.truncate(self.config.limit);

        tracing::info!(count = snippets.len(), "Semantic search complete");
        Ok(snippets)
    }

    async fn check_health(&self) -> bool {
        match self.client.get(self.ready_url()).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Retrieval health check failed");
                false
            }
        }
    }
}

//! Integration tests for the semantic retrieval client.

use serde_json::json;
use skillpath_engine::config::RetrievalConfig;
use skillpath_engine::retrieval::{HttpRetriever, KnowledgeRetriever, RetrievalError};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> RetrievalConfig {
    RetrievalConfig {
        base_url: server.uri(),
        collection: "JobKnowledge".to_string(),
        limit: 5,
        min_score: 0.7,
        timeout_secs: 2,
        api_key: None,
    }
}

#[tokio::test]
async fn test_search_sends_collection_and_parses_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(body_partial_json(json!({
            "collection": "JobKnowledge",
            "limit": 5,
            "certainty": 0.7,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "title": "ML Engineer Skills",
                    "description": "Core skills for ML roles",
                    "category": "Skills",
                    "score": 0.91
                },
                {
                    "title": "Career Switching",
                    "description": "How to move between roles",
                    "category": "Career",
                    "score": 0.74
                }
            ]
        })))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    let snippets = retriever.search("career transition skills").await.unwrap();

    assert_eq!(snippets.len(), 2);
    assert_eq!(snippets[0].title, "ML Engineer Skills");
    assert_eq!(snippets[1].category, "Career");
}

#[tokio::test]
async fn test_results_below_score_floor_are_dropped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "title": "Relevant", "description": "d", "category": "c", "score": 0.85 },
                { "title": "Marginal", "description": "d", "category": "c", "score": 0.42 }
            ]
        })))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    let snippets = retriever.search("query").await.unwrap();

    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].title, "Relevant");
}

#[tokio::test]
async fn test_results_truncated_to_limit() {
    let server = MockServer::start().await;

    let results: Vec<_> = (0..8)
        .map(|i| {
            json!({
                "title": format!("Doc {}", i),
                "description": "d",
                "category": "c",
                "score": 0.9
            })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.limit = 3;
    let retriever = HttpRetriever::new(config).unwrap();
    let snippets = retriever.search("query").await.unwrap();

    assert_eq!(snippets.len(), 3);
}

#[tokio::test]
async fn test_empty_match_is_ok_not_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    let snippets = retriever.search("query").await.unwrap();
    assert!(snippets.is_empty());
}

#[tokio::test]
async fn test_server_error_maps_to_query_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("index corrupted"))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    let err = retriever.search("query").await.unwrap_err();
    assert!(matches!(err, RetrievalError::QueryFailed(_)));
}

#[tokio::test]
async fn test_auth_failure_maps_to_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    let err = retriever.search("query").await.unwrap_err();
    assert!(matches!(err, RetrievalError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.timeout_secs = 1;
    let retriever = HttpRetriever::new(config).unwrap();

    let err = retriever.search("query").await.unwrap_err();
    assert!(matches!(err, RetrievalError::Timeout));
}

#[tokio::test]
async fn test_health_check_uses_readiness_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/.well-known/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    assert!(retriever.check_health().await);
}

#[tokio::test]
async fn test_health_check_false_when_unready() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/.well-known/ready"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::new(config_for(&server)).unwrap();
    assert!(!retriever.check_health().await);
}

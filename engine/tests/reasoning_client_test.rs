//! Integration tests for the FriendliAI reasoning client against a mock
//! OpenAI-compatible endpoint.

use serde_json::json;
use skillpath_engine::config::ReasoningConfig;
use skillpath_engine::llm::friendli::FriendliClient;
use skillpath_engine::llm::{AnalysisTurn, ReasoningClient, ReasoningError, ToolCallRequest};
use skillpath_engine::types::{CareerQuery, KnowledgeSnippet};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ReasoningConfig {
    ReasoningConfig {
        base_url: server.uri(),
        model: "meta-llama-3.1-8b-instruct".to_string(),
        timeout_secs: 2,
        api_key: Some("test-key".to_string()),
    }
}

fn query() -> CareerQuery {
    CareerQuery::new("Frontend Developer", "Machine Learning Engineer")
}

fn completion_with_content(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": content }
        }]
    })
}

#[tokio::test]
async fn test_analyze_returns_final_skill_list() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(
            json!({ "model": "meta-llama-3.1-8b-instruct", "tool_choice": "auto" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content(
            r#"["Python", "TensorFlow", "Statistics"]"#,
        )))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let turn = client.analyze(&query(), &[]).await.unwrap();

    match turn {
        AnalysisTurn::Skills(skills) => {
            assert_eq!(skills, vec!["Python", "TensorFlow", "Statistics"]);
        }
        other => panic!("Expected Skills, got {:?}", other),
    }
}

#[tokio::test]
async fn test_analyze_surfaces_tool_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "search_learning_content",
                            "arguments": "{\"skill\": \"Python\"}"
                        }
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let turn = client.analyze(&query(), &[]).await.unwrap();

    match turn {
        AnalysisTurn::ToolCall(call) => {
            assert_eq!(call.id, "call_abc");
            assert_eq!(call.name, "search_learning_content");
            assert!(call.arguments.contains("Python"));
        }
        other => panic!("Expected ToolCall, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_replays_tool_result_and_parses_skills() {
    let server = MockServer::start().await;

    // The resume request must carry the tool message with the matching id
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {},
                {},
                { "role": "assistant" },
                { "role": "tool", "tool_call_id": "call_abc" },
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content(
            r#"["Python", "TensorFlow"]"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let call = ToolCallRequest::new("call_abc", "search_learning_content", "{\"skill\":\"Python\"}");
    let snippets: Vec<KnowledgeSnippet> = Vec::new();
    let skills = client
        .resume(&query(), &snippets, &call, r#"{"results": []}"#)
        .await
        .unwrap();

    assert_eq!(skills, vec!["Python", "TensorFlow"]);
}

#[tokio::test]
async fn test_generate_snippet_strips_markdown_fences() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content(
            "```python\nprint('hello')\n```",
        )))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let code = client.generate_snippet("Python", "python", false).await.unwrap();
    assert_eq!(code, "print('hello')");
}

#[tokio::test]
async fn test_auth_failure_maps_to_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let err = client.analyze(&query(), &[]).await.unwrap_err();
    assert!(matches!(err, ReasoningError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_rate_limit_maps_to_rate_limit_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let err = client.analyze(&query(), &[]).await.unwrap_err();
    assert!(matches!(err, ReasoningError::RateLimitExceeded));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_with_content("[]"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.timeout_secs = 1;
    let client = FriendliClient::new(config).unwrap();

    let err = client.analyze(&query(), &[]).await.unwrap_err();
    assert!(matches!(err, ReasoningError::Timeout));
}

#[tokio::test]
async fn test_health_hits_model_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    assert!(client.check_health().await);
}

#[tokio::test]
async fn test_health_is_false_without_an_api_key() {
    let server = MockServer::start().await;

    let mut config = config_for(&server);
    config.api_key = None;
    let client = FriendliClient::new(config).unwrap();

    // No key means no request; the mock server sees no traffic
    assert!(!client.check_health().await);
    server.verify().await;
}

#[tokio::test]
async fn test_health_is_false_when_provider_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    assert!(!client.check_health().await);
}

#[tokio::test]
async fn test_empty_completion_is_a_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = FriendliClient::new(config_for(&server)).unwrap();
    let err = client.analyze(&query(), &[]).await.unwrap_err();
    assert!(matches!(err, ReasoningError::ParseError(_)));
}

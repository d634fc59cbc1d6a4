//! End-to-end generation against a mock OpenAI-compatible endpoint.

use std::sync::Arc;

use serde_json::json;
use strudel_ai_core::agents::config::{ENV_API_KEY, ENV_API_URL, ENV_MODEL};
use strudel_ai_core::agents::{
    ConfigResolver, EnvironmentDefaults, MemorySettingsStore, PartialConfig, RequestOrchestrator,
    SystemPrompt,
};
use strudel_ai_core::errors::AssistError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn orchestrator_for(server: &MockServer, api_key: Option<&str>) -> RequestOrchestrator {
    let url = format!("{}/v1/chat/completions", server.uri());
    let mut vars = vec![(ENV_API_URL, url), (ENV_MODEL, "gpt-4o-mini".to_string())];
    if let Some(key) = api_key {
        vars.push((ENV_API_KEY, key.to_string()));
    }
    let resolver = ConfigResolver::new(
        Arc::new(MemorySettingsStore::new()),
        EnvironmentDefaults::from_vars(vars),
    );
    RequestOrchestrator::with_http(resolver, SystemPrompt::new("You write Strudel code."))
        .unwrap()
}

#[tokio::test]
async fn test_generate_posts_openai_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": "You write Strudel code." },
                { "role": "user", "content": "four on the floor" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "```javascript\ns(\"bd*4\")\n```" },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator_for(&mock_server, Some("test-api-key"));
    let code = orchestrator.generate("four on the floor", "").await.unwrap();
    assert_eq!(code, "s(\"bd*4\")");

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("max_tokens").is_none());
}

#[tokio::test]
async fn test_generate_sends_max_tokens_when_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "max_tokens": 512 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "note(\"c e g\")" } }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator_for(&mock_server, Some("test-api-key"));
    orchestrator
        .resolver()
        .persist_config(PartialConfig {
            max_tokens: Some(512),
            ..Default::default()
        })
        .unwrap();
    let code = orchestrator.generate("a chord", "").await.unwrap();
    assert_eq!(code, "note(\"c e g\")");
}

#[tokio::test]
async fn test_generate_surfaces_api_error_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "param": null,
                "code": "invalid_api_key"
            }
        })))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator_for(&mock_server, Some("invalid-key"));
    let err = orchestrator.generate("drums", "").await.unwrap_err();
    match err {
        AssistError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_without_key_never_hits_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator_for(&mock_server, None);
    let err = orchestrator.generate("drums", "").await.unwrap_err();
    assert!(matches!(err, AssistError::CredentialMissing));
}

#[tokio::test]
async fn test_generate_reports_unreachable_endpoint() {
    let mock_server = MockServer::start().await;
    let orchestrator = orchestrator_for(&mock_server, Some("test-api-key"));
    drop(mock_server);

    let err = orchestrator.generate("drums", "").await.unwrap_err();
    assert!(matches!(err, AssistError::Network { .. }));
}

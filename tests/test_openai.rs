//! Integration tests for the OpenAI-compatible provider
//!
//! Runs the provider against a wiremock server to check:
//! - Azure and OpenAI URL shapes and credentials
//! - whole-response completions used by triage
//! - SSE token streaming, including truncated streams
//! - status code mapping and health checks

use futures::StreamExt;
use std::time::Duration;
use triage_router::llm::provider::{
    CompletionRequest, FinishReason, LlmError, LlmProvider, Message, ResponseFormat,
};
use triage_router::llm::providers::openai::{ApiFlavor, OpenAiConfig, OpenAiProvider};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn azure_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        flavor: ApiFlavor::Azure {
            api_version: "2024-10-21".to_string(),
        },
        max_retries: 0,
    }
}

fn openai_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        flavor: ApiFlavor::OpenAi,
        max_retries: 0,
    }
}

fn test_request(model: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            Message::system("You are a support agent."),
            Message::user("my app service deployment keeps failing"),
        ],
        model: model.to_string(),
        max_tokens: Some(100),
        temperature: Some(0.7),
        ..Default::default()
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25 }
    })
}

fn sse_body(chunks: &[&str], done: bool) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": chunk } }] });
        body.push_str(&format!("data: {event}\n\n"));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

async fn collect(provider: &OpenAiProvider, request: CompletionRequest) -> Vec<Result<String, LlmError>> {
    provider
        .complete_stream(request)
        .await
        .expect("stream should open")
        .collect()
        .await
}

#[tokio::test]
async fn test_azure_completion_uses_deployment_url_and_api_key_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4/chat/completions"))
        .and(query_param("api-version", "2024-10-21"))
        .and(header("api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"agent":"escalation"}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some(r#"{"agent":"escalation"}"#));
    assert!(matches!(response.finish_reason, FinishReason::Stop));
    assert_eq!(response.usage.total_tokens, 25);
    assert_eq!(provider.name(), "azure-openai");
}

#[tokio::test]
async fn test_openai_completion_uses_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("Hello!"));
    assert_eq!(provider.name(), "openai");
}

#[tokio::test]
async fn test_json_response_format_is_sent_as_json_object() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"agent":"technical_support"}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
    let mut request = test_request("gpt-4");
    request.response_format = Some(ResponseFormat::Json);

    assert!(provider.complete(request).await.is_ok());
}

#[tokio::test]
async fn test_stream_yields_chunks_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["I ", "can ", "help."], true)),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    let chunks: Vec<String> = collect(&provider, test_request("gpt-4"))
        .await
        .into_iter()
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(chunks, vec!["I ", "can ", "help."]);
    assert_eq!(chunks.concat(), "I can help.");
}

#[tokio::test]
async fn test_stream_without_done_marker_is_interrupted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["Partial ", "answer"], false)),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
    let items = collect(&provider, test_request("gpt-4")).await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_deref().unwrap(), "Partial ");
    assert_eq!(items[1].as_deref().unwrap(), "answer");
    assert!(matches!(items[2], Err(LlmError::StreamInterrupted(_))));
}

#[tokio::test]
async fn test_stream_inline_error_ends_stream() {
    let mock_server = MockServer::start().await;

    let body = format!(
        "{}data: {}\n\n",
        sse_body(&["Start"], false),
        serde_json::json!({ "error": { "message": "content filtered" } })
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
    let items = collect(&provider, test_request("gpt-4")).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "Start");
    match &items[1] {
        Err(LlmError::ApiError(message)) => assert!(message.contains("content filtered")),
        other => panic!("expected inline API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_open_failure_reports_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Access denied"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    let result = provider.complete_stream(test_request("gpt-4")).await;

    assert!(matches!(result, Err(LlmError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_status_codes_map_to_provider_errors() {
    let cases = [
        (401, "unauthorized"),
        (404, "not found"),
        (429, "rate limited"),
        (500, "server error"),
    ];

    for (status, label) in cases {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string(label))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
        let error = provider.complete(test_request("gpt-4")).await.unwrap_err();

        match status {
            401 => assert!(matches!(error, LlmError::AuthenticationFailed(_))),
            404 => assert!(matches!(error, LlmError::ModelNotFound(_))),
            429 => assert!(matches!(error, LlmError::RateLimitExceeded(_))),
            _ => assert!(matches!(error, LlmError::ApiError(ref m) if m.contains("server error"))),
        }
    }
}

#[tokio::test]
async fn test_server_errors_are_retried_up_to_max_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut config = openai_config(&mock_server.uri());
    config.max_retries = 2;
    let provider = OpenAiProvider::new(config).unwrap();

    assert!(provider.complete(test_request("gpt-4")).await.is_err());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = openai_config(&mock_server.uri());
    config.max_retries = 3;
    let provider = OpenAiProvider::new(config).unwrap();

    assert!(matches!(
        provider.complete(test_request("gpt-4")).await,
        Err(LlmError::ApiError(_))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_connectivity_error() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();
    drop(mock_server);

    let provider = OpenAiProvider::new(azure_config(&uri)).unwrap();
    let error = provider.complete(test_request("gpt-4")).await.unwrap_err();

    assert!(error.is_connectivity(), "unexpected error: {error:?}");
}

#[tokio::test]
async fn test_health_check_uses_models_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/openai/models"))
        .and(query_param("api-version", "2024-10-21"))
        .and(header("api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    assert!(provider.health_check().await.is_ok());
}

#[tokio::test]
async fn test_health_check_fails_on_rejected_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(openai_config(&mock_server.uri())).unwrap();
    assert!(matches!(
        provider.health_check().await,
        Err(LlmError::AuthenticationFailed(_))
    ));
}

#[test]
fn test_missing_api_key_is_rejected() {
    let mut config = openai_config("http://localhost:1");
    config.api_key.clear();
    assert!(matches!(
        OpenAiProvider::new(config),
        Err(LlmError::NotConfigured(_))
    ));
}

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use callio_core::{CallioError, ModelParams};
use callio_llm::{CompletionClient, CompletionRequest, Message, OpenAiCompatibleClient};

fn client(server: &MockServer) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::builder()
        .base_url(server.base_url())
        .expect("valid url")
        .api_key("test-key")
        .build()
        .expect("client")
}

fn request(prompt: &str, timeout: Duration) -> CompletionRequest {
    let params = ModelParams {
        model: "gpt-3.5-turbo".to_string(),
        system_message: "You are a helpful assistant".to_string(),
        context: vec![Message::user("Be brief"), Message::assistant("Sure")],
        temperature: 0.9,
        max_tokens: 30,
        timeout,
    };
    CompletionRequest::for_prompt(&params, prompt)
}

#[tokio::test]
async fn complete_maps_first_choice_and_usage() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer test-key")
            .json_body(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant"},
                    {"role": "user", "content": "Be brief"},
                    {"role": "assistant", "content": "Sure"},
                    {"role": "user", "content": "Widget - 4.99"}
                ],
                "temperature": 0.9,
                "max_tokens": 30,
                "top_p": 1.0
            }));
        then.status(200).json_body(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-3.5-turbo",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "A small widget"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
        }));
    });

    let completion = client(&server)
        .complete(request("Widget - 4.99", Duration::from_secs(5)))
        .await
        .expect("completion");

    assert_eq!(completion.text, "A small widget");
    assert_eq!(completion.usage.prompt_tokens, 42);
    assert_eq!(completion.usage.completion_tokens, 7);
    mock.assert();
}

#[tokio::test]
async fn complete_accepts_a_minimal_response_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "Fine"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        }));
    });

    let completion = client(&server)
        .complete(request("Widget - 4.99", Duration::from_secs(5)))
        .await
        .expect("completion");

    assert_eq!(completion.text, "Fine");
    assert_eq!(completion.usage.prompt_tokens, 3);
}

#[tokio::test]
async fn rate_limit_is_transient_with_retry_after() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(429)
            .header("Retry-After", "3")
            .json_body(json!({"error": {"message": "Rate limit reached", "type": "requests"}}));
    });

    let err = client(&server)
        .complete(request("hi", Duration::from_secs(5)))
        .await
        .unwrap_err();

    match err {
        CallioError::RateLimited {
            message,
            retry_after,
        } => {
            assert_eq!(message, "Rate limit reached");
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_service_is_classified() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(503).body("overloaded");
    });

    let err = client(&server)
        .complete(request("hi", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, CallioError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn bad_request_is_terminal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(400)
            .json_body(json!({"error": {"message": "maximum context length exceeded", "type": "invalid_request_error"}}));
    });

    let err = client(&server)
        .complete(request("hi", Duration::from_secs(5)))
        .await
        .unwrap_err();

    match err {
        CallioError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "maximum context length exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .delay(Duration::from_millis(500))
            .json_body(json!({"choices": [], "usage": null}));
    });

    let err = client(&server)
        .complete(request("hi", Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, CallioError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test]
async fn empty_choices_is_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(json!({"choices": []}));
    });

    let err = client(&server)
        .complete(request("hi", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, CallioError::InvalidResponse(_)));
}

#[tokio::test]
async fn list_models_returns_sorted_ids() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/models")
            .header("authorization", "Bearer test-key");
        then.status(200).json_body(json!({
            "object": "list",
            "data": [
                {"id": "gpt-4o", "object": "model"},
                {"id": "gpt-3.5-turbo", "object": "model"}
            ]
        }));
    });

    let models = client(&server).list_models().await.expect("models");

    assert_eq!(models, vec!["gpt-3.5-turbo".to_string(), "gpt-4o".to_string()]);
    mock.assert();
}

#[test]
fn builder_requires_api_key() {
    let err = OpenAiCompatibleClient::builder().build().unwrap_err();
    assert!(matches!(err, CallioError::InvalidConfig(_)));
}

#[test]
fn debug_redacts_api_key() {
    let client = OpenAiCompatibleClient::openai("sk-secret").unwrap();
    let rendered = format!("{client:?}");
    assert!(rendered.contains("<redacted>"));
    assert!(!rendered.contains("sk-secret"));
}

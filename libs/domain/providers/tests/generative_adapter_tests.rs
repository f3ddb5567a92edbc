//! HTTP-level tests for `GenerativeAdapter` (component B) against a mock
//! server, so the contract is exercised over the wire instead of only
//! through the `AiProvider` trait in isolation.

use refnorm_providers::{AiProvider, GenerativeAdapter, ProviderError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_response(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

#[tokio::test]
async fn returns_the_first_choice_content_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("ООО \"Ромашка\"")))
        .mount(&server)
        .await;

    let adapter = GenerativeAdapter::new("p1", "gpt-test", server.uri(), Some("test-key".to_string()));
    let completion = adapter.complete("system", "user").await.unwrap();
    assert_eq!(completion.text, "ООО \"Ромашка\"");
}

#[tokio::test]
async fn sends_system_and_user_messages_in_the_request_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "system", "content": "be terse" },
                { "role": "user", "content": "Winter Tire" },
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Winter Tire")))
        .mount(&server)
        .await;

    let adapter = GenerativeAdapter::new("p1", "gpt-test", server.uri(), None);
    let completion = adapter.complete("be terse", "Winter Tire").await.unwrap();
    assert_eq!(completion.text, "Winter Tire");
}

#[tokio::test]
async fn http_500_surfaces_as_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/chat/completions")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let adapter = GenerativeAdapter::new("p1", "gpt-test", server.uri(), None);
    let err = adapter.complete("system", "user").await.unwrap_err();
    assert!(matches!(err, ProviderError::HttpStatus(500)));
}

#[tokio::test]
async fn an_empty_choice_list_is_an_empty_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let adapter = GenerativeAdapter::new("p1", "gpt-test", server.uri(), None);
    let err = adapter.complete("system", "user").await.unwrap_err();
    assert!(matches!(err, ProviderError::EmptyResponse));
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use calpal_completions::OpenAiClient;
use calpal_completions::StaticCompletions;
use calpal_core::completion::CompletionClient;
use calpal_core::completion::CompletionError;
use calpal_core::event::ConversationTurn;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

#[tokio::test]
async fn completes_against_chat_completions_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "{\"title\": \"lunch\"}" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(format!("{}/v1", server.uri()), "test-key", "gpt-4o-mini")
        .expect("client builds");
    let reply = client
        .complete("system prompt", &[ConversationTurn::user("lunch tomorrow")])
        .await
        .expect("completion succeeds");
    assert_eq!(reply, "{\"title\": \"lunch\"}");
}

#[tokio::test]
async fn server_error_surfaces_as_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(format!("{}/v1", server.uri()), "test-key", "gpt-4o-mini")
        .expect("client builds");
    let err = client
        .complete("system prompt", &[ConversationTurn::user("lunch tomorrow")])
        .await
        .expect_err("completion fails");
    assert!(matches!(err, CompletionError::Request(_)));
}

#[tokio::test]
async fn empty_content_is_an_empty_reply_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [ { "message": { "role": "assistant", "content": "" } } ]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(format!("{}/v1", server.uri()), "test-key", "gpt-4o-mini")
        .expect("client builds");
    let err = client
        .complete("system prompt", &[ConversationTurn::user("lunch tomorrow")])
        .await
        .expect_err("completion fails");
    assert!(matches!(err, CompletionError::EmptyReply));
}

#[tokio::test]
async fn static_completions_replay_in_order() {
    let double = StaticCompletions::new();
    double.push_reply("first").await;
    double.push_error("down for maintenance").await;

    let first = double
        .complete("s", &[])
        .await
        .expect("first reply queued");
    assert_eq!(first, "first");
    assert!(double.complete("s", &[]).await.is_err());
    assert!(double.complete("s", &[]).await.is_err());
}

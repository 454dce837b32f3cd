//! End-to-end sticky session behavior (spec.md §8 scenario 2 and the
//! invariant in §4.4) driven through a real `RequestCoordinator`.

use super::support::{build_harness, UpstreamDef};
use litellm_rs::core::coordinator::RoutedRequest;
use litellm_rs::core::router::session::SessionStore;
use litellm_rs::core::router::types::Strategy;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(logical_model_id: &str, conversation_id: &str) -> RoutedRequest {
    RoutedRequest {
        logical_model_id: logical_model_id.to_string(),
        conversation_id: Some(conversation_id.to_string()),
        idempotency_key: None,
        payload: br#"{"model":"gpt-4","messages":[]}"#.to_vec(),
        moderation_content: "hello".to_string(),
        streaming: false,
    }
}

#[tokio::test]
async fn a_pinned_session_outranks_a_much_higher_weighted_provider() {
    let openai = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "openai"})))
        .mount(&openai)
        .await;

    let azure = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "azure"})))
        .mount(&azure)
        .await;

    // azure's base weight dwarfs openai's; absent stickiness it always wins.
    let harness = build_harness(
        "gpt-4",
        Strategy::StickyFirst,
        &[
            UpstreamDef {
                provider_id: "openai",
                model_id: "gpt-4o",
                base_url: openai.uri(),
                base_weight: 1.0,
            },
            UpstreamDef {
                provider_id: "azure",
                model_id: "gpt-4o",
                base_url: azure.uri(),
                base_weight: 50.0,
            },
        ],
    );

    // Pin the conversation to openai directly, bypassing the scoring that
    // would otherwise always pick azure on a cold start.
    SessionStore::new(harness.cache.clone())
        .bind("conv-1", "gpt-4", "openai", "gpt-4o")
        .await
        .unwrap();

    let response = harness
        .coordinator
        .handle_non_stream(request("gpt-4", "conv-1"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(openai.received_requests().await.unwrap().len(), 1);
    assert_eq!(azure.received_requests().await.unwrap().len(), 0);

    // A second request for the same conversation stays pinned to openai.
    harness
        .coordinator
        .handle_non_stream(request("gpt-4", "conv-1"))
        .await
        .unwrap();
    assert_eq!(openai.received_requests().await.unwrap().len(), 2);

    // An unrelated conversation is unaffected by conv-1's binding and falls
    // back to azure's higher weight.
    let unrelated = harness
        .coordinator
        .handle_non_stream(request("gpt-4", "conv-2"))
        .await
        .unwrap();
    assert_eq!(unrelated.status, 200);
    assert_eq!(azure.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rebinding_a_conversation_to_a_new_provider_preserves_created_at() {
    let upstream = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&upstream)
        .await;

    let harness = build_harness(
        "gpt-4",
        Strategy::Balanced,
        &[UpstreamDef {
            provider_id: "openai",
            model_id: "gpt-4o",
            base_url: upstream.uri(),
            base_weight: 1.0,
        }],
    );

    harness
        .coordinator
        .handle_non_stream(request("gpt-4", "conv-1"))
        .await
        .unwrap();

    let sessions = SessionStore::new(harness.cache.clone());
    let first = sessions.get("conv-1").await.unwrap().unwrap();

    harness
        .coordinator
        .handle_non_stream(request("gpt-4", "conv-1"))
        .await
        .unwrap();
    let second = sessions.get("conv-1").await.unwrap().unwrap();

    assert_eq!(first.created_at, second.created_at);
    assert_eq!(second.message_count, first.message_count + 1);
}

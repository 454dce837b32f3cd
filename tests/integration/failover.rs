//! End-to-end retry/failover behavior (spec.md §8 scenarios 3 and 5) driven
//! through a real `RequestCoordinator` against `wiremock` upstreams.

use super::support::{build_harness, UpstreamDef};
use litellm_rs::core::coordinator::RoutedRequest;
use litellm_rs::core::router::types::Strategy;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(logical_model_id: &str) -> RoutedRequest {
    RoutedRequest {
        logical_model_id: logical_model_id.to_string(),
        conversation_id: None,
        idempotency_key: None,
        payload: br#"{"model":"gpt-4","messages":[]}"#.to_vec(),
        moderation_content: "hello".to_string(),
        streaming: false,
    }
}

#[tokio::test]
async fn retryable_failure_cascades_to_the_next_provider() {
    let openai = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
        .mount(&openai)
        .await;

    let azure = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&azure)
        .await;

    let harness = build_harness(
        "gpt-4",
        Strategy::Balanced,
        &[
            UpstreamDef {
                provider_id: "openai",
                model_id: "gpt-4o",
                base_url: openai.uri(),
                base_weight: 2.0,
            },
            UpstreamDef {
                provider_id: "azure",
                model_id: "gpt-4o",
                base_url: azure.uri(),
                base_weight: 1.0,
            },
        ],
    );

    let response = harness
        .coordinator
        .handle_non_stream(request("gpt-4"))
        .await
        .expect("azure should serve the request after openai's 503");
    assert_eq!(response.status, 200);

    let failures = harness
        .cache
        .get_int("provider:failure:openai")
        .await
        .unwrap();
    assert_eq!(failures, None, "successful candidate's failure counter stays clear");
}

#[tokio::test]
async fn non_retryable_failure_aborts_without_trying_later_candidates() {
    let openai = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad api key"))
        .mount(&openai)
        .await;

    let azure = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&azure)
        .await;

    let harness = build_harness(
        "gpt-4",
        Strategy::Balanced,
        &[
            UpstreamDef {
                provider_id: "openai",
                model_id: "gpt-4o",
                base_url: openai.uri(),
                base_weight: 2.0,
            },
            UpstreamDef {
                provider_id: "azure",
                model_id: "gpt-4o",
                base_url: azure.uri(),
                base_weight: 1.0,
            },
        ],
    );

    let err = harness
        .coordinator
        .handle_non_stream(request("gpt-4"))
        .await
        .expect_err("a 401 is non-retryable and must not fall through to azure");
    assert!(err.to_string().contains("All upstream providers failed"));
}

#[tokio::test]
async fn provider_in_cooldown_is_skipped_and_reported() {
    let openai = MockServer::start().await;
    // Never actually hit: openai is pre-seeded into cooldown below.
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&openai)
        .await;

    let azure = MockServer::start().await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&azure)
        .await;

    let harness = build_harness(
        "gpt-4",
        Strategy::Balanced,
        &[
            UpstreamDef {
                provider_id: "openai",
                model_id: "gpt-4o",
                base_url: openai.uri(),
                base_weight: 5.0,
            },
            UpstreamDef {
                provider_id: "azure",
                model_id: "gpt-4o",
                base_url: azure.uri(),
                base_weight: 1.0,
            },
        ],
    );

    for _ in 0..3 {
        harness.cache.incr("provider:failure:openai").await.unwrap();
    }

    let response = harness
        .coordinator
        .handle_non_stream(request("gpt-4"))
        .await
        .expect("azure should serve once openai is in cooldown, despite its lower base weight");
    assert_eq!(response.status, 200);
    assert_eq!(openai.received_requests().await.unwrap().len(), 0);
}

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

use kiro_proxy::flow::{SharedFlowSink, TracingFlowSink};
use kiro_proxy::orchestrator::Orchestrator;
use kiro_proxy::persistence::Persistence;
use kiro_proxy::pool;
use kiro_proxy::refresher;
use kiro_proxy::server::{AppState, build_router};
use kiro_proxy::upstream::UpstreamClient;

async fn empty_pool_app() -> axum::Router {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!("kiro-proxy-routes-{}-{}.json", std::process::id(), nanos));

    let persistence = Arc::new(Persistence::new(temp_path));
    let refresher_handle = refresher::spawn(reqwest::Client::new(), "https://example.invalid".to_string()).await;
    let pool_handle = pool::spawn(Vec::new(), persistence, refresher_handle.clone()).await;
    let upstream = Arc::new(UpstreamClient::new("https://example.invalid".to_string()));
    let flow_sink: SharedFlowSink = Arc::new(TracingFlowSink);

    let orchestrator = Orchestrator::new(pool_handle.clone(), refresher_handle, upstream, flow_sink);
    let state = AppState::new(orchestrator, pool_handle);
    build_router(state)
}

#[tokio::test]
async fn healthz_reports_zero_accounts_when_pool_is_empty() {
    let app = empty_pool_app().await;

    let resp = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
    assert_eq!(json["accounts_total"], 0);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn openai_list_models_returns_static_catalog() {
    let app = empty_pool_app().await;

    let resp = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).expect("request"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
    assert_eq!(json["object"], "list");
    assert!(json["data"].as_array().expect("array").len() > 0);
}

#[tokio::test]
async fn chat_completions_returns_service_unavailable_with_no_accounts() {
    let app = empty_pool_app().await;

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .header("authorization", "Bearer unused-but-accepted")
                .body(Body::from(
                    r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn anthropic_count_tokens_estimates_without_an_upstream_call() {
    let app = empty_pool_app().await;

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages/count_tokens")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"model":"claude-sonnet-4.5","messages":[{"role":"user","content":[{"type":"text","text":"hello there"}]}]}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
    assert!(json["input_tokens"].as_u64().expect("number") > 0);
}

#[tokio::test]
async fn unknown_route_falls_through_to_404() {
    let app = empty_pool_app().await;

    let resp = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).expect("request"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

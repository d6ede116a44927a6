//! HTTP surface tests against the axum router

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::*;
use sentrysol::config::AnalysisConfig;
use sentrysol::pipeline::Orchestrator;
use sentrysol::server::{AppState, create_router};

fn app(narrative: FakeNarrative) -> Router {
    let (collaborators, _) = collaborators(healthy_activity(), FakeCompliance(Some(4)), narrative);
    create_router(Arc::new(AppState {
        orchestrator: Arc::new(Orchestrator::new(collaborators, AnalysisConfig::default())),
        keep_alive_interval: Duration::from_secs(15),
        event_buffer: 16,
    }))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn health_reports_collaborators_and_trace_id() {
    let response = app(FakeNarrative::Fail)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let trace_id = response.headers()["x-trace-id"].to_str().unwrap().to_string();
    assert!(trace_id.starts_with("ss-"), "{trace_id}");

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["collaborators"]["compliance"], true);
}

#[tokio::test]
async fn incoming_trace_id_is_echoed() {
    let response = app(FakeNarrative::Fail)
        .oneshot(
            Request::get("/")
                .header("x-trace-id", "ss-from-client")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-trace-id"], "ss-from-client");
    assert_eq!(body_json(response).await["service"], "SentrySol");
}

#[tokio::test]
async fn short_address_is_rejected_before_streaming() {
    let response = app(FakeNarrative::Fail)
        .oneshot(Request::get("/analyze/tooShort").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("32 to 44"));
}

#[tokio::test]
async fn out_of_range_limit_is_rejected() {
    let response = app(FakeNarrative::Fail)
        .oneshot(
            Request::get(format!("/analyze/{WALLET}?limit=1000"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analyze_streams_events_then_done_marker() {
    let response = app(FakeNarrative::Reply("fine".into()))
        .oneshot(
            Request::get(format!("/analyze/{WALLET}?limit=3"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let text = body_text(response).await;
    let payloads: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(payloads.len(), 17);
    assert_eq!(payloads.last(), Some(&"[DONE]"));

    let first: Value = serde_json::from_str(payloads[0]).unwrap();
    assert_eq!(first["step"], 1);
    let terminal: Value = serde_json::from_str(payloads[15]).unwrap();
    assert_eq!(terminal["terminal"], true);
    assert_eq!(terminal["progress"], 100);
    assert_eq!(terminal["data"]["analysis_result"], "fine");
}

#[tokio::test]
async fn transaction_flow_returns_directional_lists() {
    let response = app(FakeNarrative::Fail)
        .oneshot(
            Request::get(format!("/transaction-flow/{WALLET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["address"], WALLET);
    assert_eq!(body["inflow_transactions"].as_array().unwrap().len(), 1);
    assert_eq!(body["outflow_transactions"].as_array().unwrap().len(), 2);
    assert_eq!(body["summary"]["outflow_count"], 2);
    assert_eq!(body["graph_data"]["nodes"][0]["isMain"], true);
}

#[tokio::test]
async fn chat_answers_with_fallback_and_quick_analysis() {
    let response = app(FakeNarrative::Fail)
        .oneshot(
            Request::post("/chat/analyze")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"message": "anything odd?", "address": WALLET}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"], sentrysol::analysis::FALLBACK_NARRATIVE);
    assert_eq!(body["quick_analysis"]["address"], WALLET);
    assert_eq!(body["quick_analysis"]["threat_level"], "LOW");
}

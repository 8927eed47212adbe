//! HTTP route tests for the health and session endpoints

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use helpers::Harness;
use runlog_bot::{build_router, AppState};

async fn get_json(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_module_and_sessions() {
    let h = Harness::new();
    h.begin("ana").await;
    let app = build_router(AppState::new(h.engine.clone()));

    let (status, json) = get_json(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "runlog-bot");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["active_sessions"], 1);
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_sessions_listing_and_sweep() {
    let h = Harness::new();
    h.begin("bob").await;
    h.clock.advance(chrono::Duration::minutes(90));
    h.begin("ana").await;
    let app = build_router(AppState::new(h.engine.clone()));

    let (status, json) = get_json(app.clone(), "GET", "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let sessions = json.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["user_id"], "ana");
    assert_eq!(sessions[0]["stage"], "initial");
    assert_eq!(sessions[1]["idle_seconds"], 5400);

    let (status, json) = get_json(app, "POST", "/sessions/sweep").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["evicted"], 1);
    assert_eq!(json["remaining"], 1);
    assert_eq!(h.engine.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = Harness::new();
    let app = build_router(AppState::new(h.engine.clone()));
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

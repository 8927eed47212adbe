//! Session inspection endpoints
//!
//! Read-only view of live flows plus a manual sweep trigger for operators.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use runlog_common::events::FlowInstanceId;

use crate::flow::Stage;
use crate::AppState;

/// One live session
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub user_id: String,
    pub instance: FlowInstanceId,
    pub stage: Stage,
    pub last_activity: DateTime<Utc>,
    pub idle_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub evicted: usize,
    pub remaining: usize,
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let store = state.engine.store();
    let now = store.now();
    let sessions = store
        .snapshot()
        .await
        .into_iter()
        .map(|s| SessionSummary {
            idle_seconds: now.signed_duration_since(s.last_activity).num_seconds().max(0),
            user_id: s.user_id,
            instance: s.instance_id,
            stage: s.stage,
            last_activity: s.last_activity,
        })
        .collect();
    Json(sessions)
}

/// POST /sessions/sweep
pub async fn sweep_sessions(State(state): State<AppState>) -> Json<SweepResponse> {
    let evicted = state.engine.sweep().await;
    let remaining = state.engine.store().len().await;
    tracing::info!(evicted, remaining, "Manual sweep requested");
    Json(SweepResponse { evicted, remaining })
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/sweep", post(sweep_sessions))
}

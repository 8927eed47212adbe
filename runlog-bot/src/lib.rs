//! runlog-bot library interface
//!
//! Exposes the flow engine, session store and collaborator traits for the
//! binary and for integration tests.

pub mod api;
pub mod backend;
pub mod console;
pub mod error;
pub mod extract;
pub mod flow;
pub mod notify;
pub mod render;
pub mod session;

pub use crate::error::{FlowError, Result};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};

use crate::flow::FlowEngine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FlowEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<FlowEngine>) -> Self {
        Self {
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::session_routes())
        .with_state(state)
}

//! Liveness endpoint.
//!
//! `GET /health` reports the service name, the current time and the
//! uptime since the handler chain was built.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub struct HealthState {
    service_name: Arc<str>,
    started_at: Instant,
}

impl HealthState {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: Arc::from(service_name),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// Seconds since start.
    pub uptime: f64,
}

pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Router serving `/health`.
pub fn health_routes(state: HealthState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .with_state(state)
}

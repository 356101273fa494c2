//! Health check handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub graph_store: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: polikg_common::VERSION.to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Readiness probe - pings the graph store
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = state.reasoner.store();
    let deadline = Duration::from_millis(state.config.reasoning.store_timeout_ms);
    let start = Instant::now();

    let store_check = match tokio::time::timeout(deadline, store.ping()).await {
        Ok(Ok(())) => CheckResult {
            status: "up".to_string(),
            backend: store.backend().to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Ok(Err(e)) => CheckResult {
            status: "down".to_string(),
            backend: store.backend().to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
        Err(_) => CheckResult {
            status: "down".to_string(),
            backend: store.backend().to_string(),
            latency_ms: None,
            error: Some(format!("ping timed out after {}ms", deadline.as_millis())),
        },
    };

    let all_healthy = store_check.status == "up";
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                graph_store: store_check,
            },
        }),
    )
}

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

/// Health, readiness and liveness probes plus the Prometheus scrape endpoint.
pub fn monitoring_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .route("/metrics", get(crate::observability::metrics_handler))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

#[derive(Serialize)]
struct ServiceStatus {
    status: &'static str,
    error: Option<String>,
}

#[derive(Serialize)]
struct DetailedHealth {
    status: &'static str,
    database: ServiceStatus,
    redis: ServiceStatus,
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(serde_json::json!({ "status": "healthy" })))
}

async fn detailed_health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db = check_database(&state).await;
    let redis = check_redis(&state).await;

    let overall = if db.status == "healthy" && redis.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };
    let status_code = if overall == "healthy" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status_code, axum::Json(DetailedHealth { status: overall, database: db, redis }))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state.db.health_check().await.is_ok();
    let redis_ok = state.redis.health_check().await.is_ok();

    if db_ok && redis_ok {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

async fn check_database(state: &AppState) -> ServiceStatus {
    match state.db.health_check().await {
        Ok(()) => ServiceStatus { status: "healthy", error: None },
        Err(e) => {
            error!("database health check failed: {}", e);
            ServiceStatus { status: "unhealthy", error: Some(e.to_string()) }
        }
    }
}

async fn check_redis(state: &AppState) -> ServiceStatus {
    match state.redis.health_check().await {
        Ok(()) => ServiceStatus { status: "healthy", error: None },
        Err(e) => {
            error!("redis health check failed: {}", e);
            ServiceStatus { status: "unhealthy", error: Some(e.to_string()) }
        }
    }
}

//! Shopping List Migration Wizard service: detects expired flyer-backed list items, proposes
//! brand-aware replacement offers under a two-store coverage constraint, and applies the
//! user's decisions atomically while preserving an immutable price-history audit trail.

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod domains;
pub mod middleware;
pub mod monitoring;
pub mod observability;
pub mod security;
pub mod state;
pub mod tasks;

use api::create_api_router;
use middleware::rate_limit_middleware;
use monitoring::monitoring_router;
use observability::metrics_middleware;
use security::{get_cors_layer, security_headers_middleware};
use state::AppState;

/// Assembles the full HTTP surface: unauthenticated health/metrics endpoints, the
/// bearer-authenticated wizard API, and the ambient middleware stack (tracing, compression,
/// CORS, security headers, per-request metrics, and the wizard-start rate limit).
pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Health/readiness/liveness + Prometheus scrape — no auth required.
        .merge(monitoring_router())
        // The wizard API surface, bearer-authenticated inside `create_api_router`.
        .merge(create_api_router())
        .with_state(app_state.clone())
        // Requires `CurrentUser` on request extensions, so it must run after the auth
        // middleware nested inside `create_api_router` — applied here at the top level
        // since it is a no-op for every route but `startWizard`.
        .layer(axum_middleware::from_fn_with_state(app_state, rate_limit_middleware))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(
            CompressionLayer::new()
                .gzip(true)
                .br(false)
                .deflate(true)
                .compress_when(SizeAbove::new(1024)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(get_cors_layer())
        .layer(axum_middleware::from_fn(security_headers_middleware))
}

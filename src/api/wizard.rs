//! HTTP handlers for the shopping-list migration wizard, mounted under `/wizard`.

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::domains::wizard::{ConfirmResult, Decision, WizardError, WizardSession};
use crate::middleware::CurrentUser;
use crate::observability::record_wizard_latency;
use crate::state::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lists/:list_id/start", post(start_wizard))
        .route("/lists/:list_id/expired-item-count", get(expired_item_count))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/items/:item_id/decide", post(decide_item))
        .route("/sessions/:session_id/apply-bulk", post(apply_bulk_decisions))
        .route("/sessions/:session_id/confirm", post(confirm_wizard))
        .route("/sessions/:session_id/cancel", post(cancel_wizard))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers.get("Idempotency-Key").and_then(|h| h.to_str().ok()).map(|s| s.to_string())
}

async fn timed<T>(operation: &'static str, fut: impl std::future::Future<Output = Result<T, WizardError>>) -> Result<T, WizardError> {
    let start = std::time::Instant::now();
    let result = fut.await;
    record_wizard_latency(operation, start.elapsed().as_secs_f64() * 1000.0);
    result
}

#[derive(Debug, Deserialize, Default)]
pub struct StartWizardRequest {
    #[serde(default)]
    pub preferred_store_ids: Vec<i64>,
}

async fn start_wizard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(list_id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<StartWizardRequest>>,
) -> Result<Json<WizardSession>, WizardError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let preferred: HashSet<i64> = request.preferred_store_ids.into_iter().collect();
    let key = idempotency_key(&headers);

    let session = timed("start_wizard", state.wizard.start_wizard(user.user_id, list_id, &preferred, key.as_deref())).await?;

    info!(
        session_id = %session.session_id,
        list_id,
        user_id = user.user_id,
        item_count = session.expired_items.len(),
        store_count = session.selected_stores.len(),
        operation = "start_wizard",
        "wizard session started"
    );

    Ok(Json(session))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
) -> Result<Json<WizardSession>, WizardError> {
    let session = timed("wizard_session", state.wizard.wizard_session(user.user_id, &session_id)).await?;
    Ok(Json(session))
}

async fn expired_item_count(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
) -> Result<Json<serde_json::Value>, WizardError> {
    let count = timed("expired_item_count", state.wizard.expired_item_count(list_id)).await?;
    Ok(Json(serde_json::json!({ "expired_item_count": count })))
}

async fn decide_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path((session_id, item_id)): Path<(String, i64)>,
    headers: HeaderMap,
    Json(decision): Json<Decision>,
) -> Result<Json<WizardSession>, WizardError> {
    let key = idempotency_key(&headers);
    let session = timed(
        "decide_item",
        state.wizard.decide_item(user.user_id, &session_id, item_id, decision, key.as_deref()),
    )
    .await?;

    info!(
        session_id = %session.session_id,
        list_id = session.list_id,
        item_count = session.expired_items.len(),
        store_count = session.selected_stores.len(),
        operation = "decide_item",
        "wizard decision recorded"
    );

    Ok(Json(session))
}

async fn apply_bulk_decisions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<WizardSession>, WizardError> {
    let key = idempotency_key(&headers);
    let session = timed(
        "apply_bulk_decisions",
        state.wizard.apply_bulk_decisions(user.user_id, &session_id, key.as_deref()),
    )
    .await?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    #[serde(flatten)]
    result: ConfirmResult,
}

async fn confirm_wizard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConfirmResponse>, WizardError> {
    let key = idempotency_key(&headers);
    let result = timed(
        "confirm_wizard",
        state.wizard.confirm_wizard(user.user_id, &session_id, key.as_deref()),
    )
    .await?;

    info!(
        session_id = %session_id,
        items_updated = result.items_updated,
        items_deleted = result.items_deleted,
        store_count = result.store_count,
        operation = "confirm_wizard",
        "wizard session confirmed"
    );

    Ok(Json(ConfirmResponse { result }))
}

async fn cancel_wizard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, WizardError> {
    let key = idempotency_key(&headers);
    timed("cancel_wizard", state.wizard.cancel_wizard(user.user_id, &session_id, key.as_deref())).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

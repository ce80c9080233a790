use axum::{extract::{Request, State}, http::{HeaderValue, StatusCode}, middleware::Next, response::Response};
use chrono::{Datelike, Timelike, Utc};
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::warn;

use crate::api::common::ErrorResponse;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// `startWizard` is the only rate-limited operation: five session starts per user per hour.
const WIZARD_START_PER_HOUR: u32 = 5;

fn hour_key(user_id: i64) -> (String, u64) {
    let now = Utc::now();
    let key = format!(
        "rl:wizard_start:u:{}:h:{}{:02}{:02}{:02}",
        user_id, now.year(), now.month(), now.day(), now.hour()
    );
    let ttl = 3600 - (now.minute() * 60 + now.second()) as u64;
    (key, ttl)
}

/// Applies the wizard-start window only; every other route passes through untouched.
/// Mirrors the teacher's windowed-counter technique (`INCR` + `EXPIRE`) scoped to the one
/// operation the spec actually asks to be rate-limited.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, axum::Json<ErrorResponse>)> {
    let is_start_route = req.uri().path().ends_with("/start") && req.method() == axum::http::Method::POST;
    if !is_start_route {
        return Ok(next.run(req).await);
    }

    let user_id = match req.extensions().get::<CurrentUser>() {
        Some(u) => u.user_id,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                axum::Json(ErrorResponse {
                    error: "AUTH_REQUIRED".into(),
                    message: "Authentication required before rate limiting.".into(),
                    code: StatusCode::UNAUTHORIZED.as_u16().to_string(),
                    details: None,
                }),
            ))
        }
    };

    let (key, ttl) = hour_key(user_id);
    let mut conn = state.redis.connection();
    let count: i64 = conn.incr(&key, 1).await.unwrap_or(1);
    if count == 1 {
        let _: () = conn.expire(&key, ttl as i64).await.unwrap_or(());
    }

    if count as u32 > WIZARD_START_PER_HOUR {
        warn!(user_id, count, "wizard start rate limit exceeded");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(ErrorResponse {
                error: "RATE_LIMIT_HOURLY".into(),
                message: format!("Hourly limit of {} wizard starts exceeded", WIZARD_START_PER_HOUR),
                code: StatusCode::TOO_MANY_REQUESTS.as_u16().to_string(),
                details: Some(serde_json::json!({ "retry_after_seconds": ttl })),
            }),
        ));
    }

    let mut response = next.run(req).await;
    let remaining = WIZARD_START_PER_HOUR.saturating_sub(count as u32);
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response.headers_mut().insert("X-RateLimit-Remaining-Hour", value);
    }
    Ok(response)
}

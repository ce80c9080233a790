// Security middleware: response hardening headers and CORS policy.
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tracing::{info, warn};

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(HeaderName::from_static("x-content-type-options"), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY"));
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'self'; script-src 'self'; style-src 'self'; object-src 'none'; frame-src 'none';"),
    );

    Ok(response)
}

/// CORS configuration for production.
///
/// Reads allowed origins from `CORS_ALLOWED_ORIGINS` (comma-separated). Defaults to permissive
/// `*` for development if unset.
pub fn get_cors_layer() -> tower_http::cors::CorsLayer {
    use axum::http::Method;
    use tower_http::cors::{Any, CorsLayer};

    let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| {
        warn!("CORS_ALLOWED_ORIGINS not set, using permissive mode for development");
        "*".to_string()
    });

    info!(origins = %cors_origins, "CORS configured");

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("idempotency-key"),
        ])
        .max_age(Duration::from_secs(3600));

    if cors_origins.trim() == "*" {
        return cors_layer.allow_origin(Any).allow_credentials(false);
    }

    let origins: Vec<HeaderValue> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("No valid CORS origins found, defaulting to permissive mode");
        cors_layer.allow_origin(Any).allow_credentials(false)
    } else {
        cors_layer.allow_origin(origins).allow_credentials(true)
    }
}

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use jsonwebtoken::{decode, DecodingKey, Validation, Algorithm};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::LazyLock;
use tracing::{error, warn};

use crate::api::common::ErrorResponse;

mod error_messages {
    pub const ERR_MISSING_AUTH: &str = "Missing Authorization header";
    pub const MSG_AUTH_REQUIRED: &str = "Authentication required. Please provide a valid Bearer token.";
    pub const ERR_INVALID_AUTH_FORMAT: &str = "Invalid Authorization header format";
    pub const MSG_BEARER_REQUIRED: &str = "Authorization header must start with 'Bearer '.";
    pub const ERR_EMPTY_TOKEN: &str = "Empty JWT token";
    pub const MSG_PROVIDE_TOKEN: &str = "Please provide a valid JWT token.";
    pub const ERR_TOKEN_EXPIRED: &str = "Token expired";
    pub const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
    pub const ERR_INVALID_TOKEN: &str = "Invalid token";
    pub const MSG_INVALID_CREDENTIALS: &str = "Could not validate credentials. Please log in again.";
}
use error_messages::*;

/// JWT claims as issued by the user-facing auth service. We only decode them here;
/// issuing and refreshing tokens is that service's job, not ours.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> Result<i64, String> {
        self.sub
            .parse::<i64>()
            .map_err(|_| format!("Invalid user_id in token: '{}'", self.sub))
    }
}

/// Current user extracted from the JWT, attached to request extensions for handlers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub email: String,
}

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

static JWT_SECRET: LazyLock<String> = LazyLock::new(|| {
    env::var("JWT_SECRET")
        .expect("CRITICAL: JWT_SECRET environment variable must be set. Server cannot start without a secure JWT secret.")
});

fn get_jwt_secret() -> &'static str {
    &JWT_SECRET
}

#[inline]
fn static_error(error: &'static str, message: &'static str) -> ErrorResponse {
    ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        code: StatusCode::UNAUTHORIZED.as_u16().to_string(),
        details: None,
    }
}

/// Decode and validate the bearer JWT, attaching `CurrentUser` to the request for handlers
/// and for `rate_limit::rate_limit_middleware` downstream.
pub async fn extract_current_user(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header");
            (StatusCode::UNAUTHORIZED, Json(static_error(ERR_MISSING_AUTH, MSG_AUTH_REQUIRED)))
        })?;

    if !auth_header.starts_with("Bearer ") {
        warn!("Invalid Authorization header format");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(static_error(ERR_INVALID_AUTH_FORMAT, MSG_BEARER_REQUIRED)),
        ));
    }

    let token = auth_header.trim_start_matches("Bearer ").trim();
    if token.is_empty() {
        warn!("Empty JWT token");
        return Err((StatusCode::UNAUTHORIZED, Json(static_error(ERR_EMPTY_TOKEN, MSG_PROVIDE_TOKEN))));
    }

    let decoding_key = DecodingKey::from_secret(get_jwt_secret().as_bytes());
    let validation = Validation::new(JWT_ALGORITHM);

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        error!("JWT validation failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                (StatusCode::UNAUTHORIZED, Json(static_error(ERR_TOKEN_EXPIRED, MSG_SESSION_EXPIRED)))
            }
            _ => (StatusCode::UNAUTHORIZED, Json(static_error(ERR_INVALID_TOKEN, MSG_INVALID_CREDENTIALS))),
        }
    })?;

    let claims = token_data.claims;
    let user_id = claims.user_id().map_err(|_| {
        error!("Invalid user_id in JWT sub field: {}", claims.sub);
        (StatusCode::UNAUTHORIZED, Json(static_error(ERR_INVALID_TOKEN, MSG_INVALID_CREDENTIALS)))
    })?;

    request.extensions_mut().insert(CurrentUser {
        user_id,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn decodes_valid_token() {
        let claims = JwtClaims {
            sub: "42".to_string(),
            email: "shopper@example.com".to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
            iat: chrono::Utc::now().timestamp(),
        };

        let encoding_key = EncodingKey::from_secret(get_jwt_secret().as_bytes());
        let token = encode(&Header::new(JWT_ALGORITHM), &claims, &encoding_key).unwrap();

        let decoding_key = DecodingKey::from_secret(get_jwt_secret().as_bytes());
        let decoded = decode::<JwtClaims>(&token, &decoding_key, &Validation::new(JWT_ALGORITHM)).unwrap();

        assert_eq!(decoded.claims.user_id().unwrap(), 42);
    }
}

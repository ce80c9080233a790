//! Error taxonomy for the migration wizard, independent of the generic `shared::AppError` used
//! by the ambient stack — the wizard's error codes are part of its observability and API
//! contract, so they get their own enum rather than being folded into the shared one.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::common::ErrorResponse;
use crate::observability::record_error;

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("session expired")]
    Expired,

    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("stale data on items {item_ids:?}")]
    StaleData { item_ids: Vec<i64> },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl WizardError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WizardError::Validation { .. } => "VALIDATION_ERROR",
            WizardError::Forbidden { .. } => "FORBIDDEN",
            WizardError::NotFound { .. } => "NOT_FOUND",
            WizardError::Conflict { .. } => "CONFLICT",
            WizardError::Expired => "EXPIRED",
            WizardError::RateLimited { .. } => "RATE_LIMITED",
            WizardError::StaleData { .. } => "STALE_DATA",
            WizardError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WizardError::Validation { .. } => StatusCode::BAD_REQUEST,
            WizardError::Forbidden { .. } => StatusCode::FORBIDDEN,
            WizardError::NotFound { .. } => StatusCode::NOT_FOUND,
            WizardError::Conflict { .. } => StatusCode::CONFLICT,
            WizardError::Expired => StatusCode::GONE,
            WizardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            WizardError::StaleData { .. } => StatusCode::CONFLICT,
            WizardError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for WizardError {
    fn from(e: sqlx::Error) -> Self {
        WizardError::Internal { message: format!("database error: {e}") }
    }
}

impl From<shared::AppError> for WizardError {
    fn from(e: shared::AppError) -> Self {
        WizardError::Internal { message: e.to_string() }
    }
}

impl From<reqwest::Error> for WizardError {
    fn from(e: reqwest::Error) -> Self {
        WizardError::Internal { message: format!("search collaborator error: {e}") }
    }
}

#[derive(Serialize)]
struct StaleDataDetails {
    item_ids: Vec<i64>,
}

impl IntoResponse for WizardError {
    fn into_response(self) -> axum::response::Response {
        record_error(self.code());
        tracing::warn!(code = self.code(), "wizard operation failed: {}", self);

        let details = match &self {
            WizardError::RateLimited { retry_after_seconds } => {
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds }))
            }
            WizardError::StaleData { item_ids } => serde_json::to_value(StaleDataDetails {
                item_ids: item_ids.clone(),
            })
            .ok(),
            _ => None,
        };

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            code: status.as_u16().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

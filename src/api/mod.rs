pub mod common;
pub mod wizard;

use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};

use crate::middleware::extract_current_user;
use crate::state::AppState;

/// The authenticated API surface: every route here requires a valid bearer token. The
/// wizard-start rate limit is layered at the top level in `lib.rs` instead of here, since it
/// reads `CurrentUser` from request extensions and must run after this auth layer regardless
/// of which router nests it.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new().nest("/wizard", wizard::create_router()).layer(axum_middleware::from_fn(extract_current_user))
}

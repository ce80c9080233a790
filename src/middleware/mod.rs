pub mod auth;
pub mod rate_limit;

pub use auth::{extract_current_user, CurrentUser, JwtClaims};
pub use rate_limit::rate_limit_middleware;

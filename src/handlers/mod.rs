pub mod admin;
pub mod public;
pub mod webhooks;

use axum::Router;

use crate::config::RateLimitConfig;
use crate::db::AppState;

/// Full application router. Pass `None` to skip per-IP rate limiting
/// (tests drive the router without peer addresses).
pub fn app(state: AppState, rate_limit: Option<RateLimitConfig>) -> Router {
    Router::new()
        // Public endpoints (no auth)
        .merge(public::router(rate_limit))
        // Webhook endpoints (signature auth)
        .merge(webhooks::router(rate_limit))
        // Admin API (static key auth)
        .merge(admin::router(state.clone()))
        .with_state(state)
}

mod gumroad;

pub use gumroad::*;

use axum::{Router, routing::post};

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

pub fn router(limits: Option<RateLimitConfig>) -> Router<AppState> {
    let router = Router::new().route("/api/webhook/gumroad", post(handle_gumroad_webhook));
    match limits {
        Some(limits) => router.layer(rate_limit::standard_layer(limits.standard_rpm)),
        None => router,
    }
}

mod generate;
mod stats;

pub use generate::*;
pub use stats::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(generate_activation))
        .route("/api/admin/stats", get(admin_stats))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}

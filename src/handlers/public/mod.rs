mod verify;

pub use verify::*;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct Endpoints {
    health: &'static str,
    generate: &'static str,
    verify: &'static str,
    webhook: &'static str,
    admin: &'static str,
}

#[derive(Serialize)]
struct ServiceInfo {
    service: String,
    version: &'static str,
    status: &'static str,
    endpoints: Endpoints,
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: format!("{} Activation Server", state.app_name),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        endpoints: Endpoints {
            health: "/health",
            generate: "/api/generate (POST)",
            verify: "/api/verify (POST)",
            webhook: "/api/webhook/gumroad (POST)",
            admin: "/api/admin/*",
        },
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub fn router(limits: Option<RateLimitConfig>) -> Router<AppState> {
    let standard = Router::new().route("/api/verify", post(verify_activation));
    let relaxed = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health));

    match limits {
        Some(limits) => standard
            .layer(rate_limit::standard_layer(limits.standard_rpm))
            .merge(relaxed.layer(rate_limit::relaxed_layer(limits.relaxed_rpm))),
        None => standard.merge(relaxed),
    }
}

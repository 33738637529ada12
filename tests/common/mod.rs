//! Test utilities and fixtures for activation server integration tests

#![allow(dead_code, unused_imports)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use chrono::Utc;
use hmac::{Hmac, Mac};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use sha2::Sha256;

// Re-export the main library crate
pub use activation_server::activation::*;
pub use activation_server::codec::*;
pub use activation_server::config::Config;
pub use activation_server::db::{AppState, DbPool, create_pool, init_db, queries};
pub use activation_server::email::EmailService;
pub use activation_server::error::AppError;
pub use activation_server::handlers;
pub use activation_server::intake;
pub use activation_server::models::*;

pub const TEST_SECRET: &str = "test-activation-secret";
pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

pub const ONE_DAY: i64 = 86400;

/// File-backed SQLite database in the temp dir, removed on drop.
///
/// In-memory databases are per-connection, so pooled and multi-threaded
/// tests need a real file.
pub struct TestDb {
    pub path: PathBuf,
    pub pool: DbPool,
}

impl TestDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!(
            "activation_server_test_{}.db",
            uuid::Uuid::new_v4()
        ));
        let pool = create_pool(path.to_str().expect("temp path is UTF-8"))
            .expect("Failed to create test pool");
        init_db(&pool.get().expect("Failed to get connection")).expect("Failed to init schema");
        Self { path, pool }
    }

    pub fn conn(&self) -> PooledConnection<SqliteConnectionManager> {
        self.pool.get().expect("Failed to get connection")
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let path = self.path.display().to_string();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{}-wal", path));
        let _ = std::fs::remove_file(format!("{}-shm", path));
    }
}

/// Dev-mode config with the test secret, no admin key, no webhook secret
/// and log-only email.
pub fn test_config() -> Config {
    Config::for_secret(TEST_SECRET)
}

pub fn test_service(db: &TestDb) -> ActivationService {
    test_service_with(db, &test_config())
}

pub fn test_service_with(db: &TestDb, config: &Config) -> ActivationService {
    let email = Arc::new(EmailService::new(&config.email));
    ActivationService::new(db.pool.clone(), config, email)
}

/// App state with the admin key and webhook secret set.
pub fn test_app_state(db: &TestDb) -> AppState {
    let mut config = test_config();
    config.admin_api_key = Some(TEST_ADMIN_KEY.to_string());
    config.webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
    app_state_with(db, &config)
}

pub fn app_state_with(db: &TestDb, config: &Config) -> AppState {
    AppState {
        db: db.pool.clone(),
        activation: test_service_with(db, config),
        admin_api_key: config.admin_api_key.clone(),
        webhook_secret: config.webhook_secret.clone(),
        app_name: config.app_name.clone(),
    }
}

/// Full router without rate limiting (oneshot requests carry no peer address).
pub fn test_app(state: AppState) -> Router {
    handlers::app(state, None)
}

/// Mint and persist a license without notification.
pub fn create_test_license(
    service: &ActivationService,
    subscriber: &str,
    tier: Tier,
    max_devices: Option<u32>,
) -> License {
    let conn = service.db().get().expect("Failed to get connection");
    let request = IssueLicense {
        max_devices,
        ..IssueLicense::new(subscriber, tier, 365)
    };
    service
        .mint(&conn, &request)
        .expect("Failed to mint test license")
}

/// A correctly signed code whose embedded expiry is `days_ago` days in the past.
pub fn expired_code(codec: &CodeCodec, subscriber: &str, days_ago: i64) -> (String, LicenseClaims) {
    let now = Utc::now().timestamp();
    let claims = LicenseClaims::new(
        subscriber,
        Tier::Personal,
        now - (days_ago + 30) * ONE_DAY,
        30,
        3,
        None,
    );
    let code = codec.encode(&claims).expect("Failed to encode expired code");
    (code, claims)
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

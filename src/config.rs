use std::env;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Secret used when running with `APP_ENV=dev` and no `ACTIVATION_SECRET`.
const DEV_ACTIVATION_SECRET: &str = "dev-only-activation-secret-do-not-ship";

/// Rate limit configuration for public endpoints (requests per minute per IP).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// /api/verify, /api/webhook/*
    pub standard_rpm: u32,
    /// /, /health
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

/// Outbound email settings. With neither a Resend key nor a webhook URL,
/// emails are only logged.
#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub resend_api_key: Option<String>,
    pub from_email: String,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    /// Single shared secret the code cipher key is derived from.
    pub activation_secret: String,
    /// Static key required in `X-API-Key` for admin endpoints. `None` locks them.
    pub admin_api_key: Option<String>,
    /// Shared secret for purchase webhook signatures. `None` accepts all.
    pub webhook_secret: Option<String>,
    pub email: EmailConfig,
    pub notify_timeout: Duration,
    pub app_name: String,
    /// Accept codes that decode but have no database record.
    pub allow_unregistered_codes: bool,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_var("PORT", 3000)?;

        let activation_secret = match non_empty_var("ACTIVATION_SECRET") {
            Some(secret) => secret,
            None if dev_mode => {
                tracing::warn!("ACTIVATION_SECRET not set, using the development secret");
                DEV_ACTIVATION_SECRET.to_string()
            }
            None => {
                return Err(AppError::Config(
                    "ACTIVATION_SECRET must be set outside dev mode".into(),
                ));
            }
        };

        let email = EmailConfig {
            resend_api_key: non_empty_var("RESEND_API_KEY"),
            from_email: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            webhook_url: non_empty_var("EMAIL_WEBHOOK_URL"),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            standard_rpm: parse_var("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm)?,
            relaxed_rpm: parse_var("RATE_LIMIT_RELAXED_RPM", defaults.relaxed_rpm)?,
        };
        if rate_limit.standard_rpm == 0 || rate_limit.relaxed_rpm == 0 {
            return Err(AppError::Config("Rate limits must be greater than 0".into()));
        }

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "activations.db".to_string()),
            dev_mode,
            activation_secret,
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            webhook_secret: non_empty_var("WEBHOOK_SECRET"),
            email,
            notify_timeout: Duration::from_secs(parse_var("NOTIFY_TIMEOUT_SECS", 10)?),
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "PDF Fusion Pro".to_string()),
            allow_unregistered_codes: parse_var("ALLOW_UNREGISTERED_CODES", true)?,
            rate_limit,
        })
    }

    /// Minimal configuration for tests and tooling: dev mode, no admin key,
    /// no webhook secret, log-only email.
    pub fn for_secret(activation_secret: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_path: "activations.db".to_string(),
            dev_mode: true,
            activation_secret: activation_secret.to_string(),
            admin_api_key: None,
            webhook_secret: None,
            email: EmailConfig {
                from_email: "noreply@localhost".to_string(),
                ..Default::default()
            },
            notify_timeout: Duration::from_secs(10),
            app_name: "PDF Fusion Pro".to_string(),
            allow_unregistered_codes: true,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}

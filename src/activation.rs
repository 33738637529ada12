//! Activation workflow: minting codes and verifying them on first use.
//!
//! Issuance persists the license, then notifies the subscriber as a separate
//! post-commit step whose outcome never affects the license. Verification
//! folds every user-facing failure into a [`VerificationResult`]; only
//! storage faults surface as errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::codec::{CodeCodec, CodecError, clean_code, code_prefix, format_code};
use crate::config::Config;
use crate::db::{DbPool, queries, queries::BindOutcome};
use crate::email::{ActivationEmail, EmailSendResult, EmailService};
use crate::error::{AppError, Result};
use crate::models::{
    DEFAULT_DEVICE_NAME, IssueLicense, License, LicenseClaims, MAX_VALIDITY_DAYS, Tier,
};

/// Why a code was not accepted. The display text is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed code")]
    Malformed,

    #[error("expired")]
    Expired,

    #[error("device limit reached {limit}")]
    DeviceLimit { limit: u32 },

    /// The code decodes but has no record and unregistered codes are disabled.
    #[error("unknown code")]
    UnknownCode,
}

impl Rejection {
    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed_code",
            Rejection::Expired => "expired",
            Rejection::DeviceLimit { .. } => "device_limit",
            Rejection::UnknownCode => "unknown_code",
        }
    }
}

/// License data returned for an accepted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedLicense {
    pub subscriber: String,
    pub tier: Tier,
    pub expires_at: i64,
    pub max_devices: u32,
    /// Whole days until expiry, floored
    pub days_remaining: i64,
    /// False when the code decoded but has no database record
    pub registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid(VerifiedLicense),
    Invalid(Rejection),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid(_))
    }
}

/// Outcome of the best-effort notification after issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Handed to the mail provider or webhook
    Sent,
    /// No delivery configured, or nothing to send to
    Skipped,
    Failed,
    TimedOut,
}

/// A minted license and what happened to its notification.
#[derive(Debug, Clone)]
pub struct IssuedLicense {
    pub license: License,
    pub notification: NotificationOutcome,
}

/// Mints and verifies activation codes against the license store.
#[derive(Clone)]
pub struct ActivationService {
    db: DbPool,
    codec: CodeCodec,
    email: Arc<EmailService>,
    notify_timeout: Duration,
    allow_unregistered_codes: bool,
    app_name: String,
}

impl ActivationService {
    pub fn new(db: DbPool, config: &Config, email: Arc<EmailService>) -> Self {
        Self {
            db,
            codec: CodeCodec::from_config(config),
            email,
            notify_timeout: config.notify_timeout,
            allow_unregistered_codes: config.allow_unregistered_codes,
            app_name: config.app_name.clone(),
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    pub fn codec(&self) -> &CodeCodec {
        &self.codec
    }

    /// Issue a license and notify the subscriber.
    ///
    /// The license is committed before notification starts; a failed or
    /// slow notification is reported in the result, never as an error.
    pub async fn issue(&self, request: &IssueLicense) -> Result<IssuedLicense> {
        let license = {
            let conn = self.db.get()?;
            self.mint(&conn, request)?
        };
        let notification = self.notify_issued(&license).await;
        Ok(IssuedLicense {
            license,
            notification,
        })
    }

    /// Encode and persist a license on `conn` (which may be a transaction).
    /// No notification is sent.
    pub fn mint(&self, conn: &Connection, request: &IssueLicense) -> Result<License> {
        let subscriber = request.subscriber.trim();
        if subscriber.is_empty() {
            return Err(AppError::BadRequest("Subscriber is required".into()));
        }
        if !(1..=MAX_VALIDITY_DAYS).contains(&request.validity_days) {
            return Err(AppError::BadRequest(format!(
                "Validity must be between 1 and {} days",
                MAX_VALIDITY_DAYS
            )));
        }
        let max_devices = request.effective_max_devices();
        if max_devices < 1 {
            return Err(AppError::BadRequest("max_devices must be at least 1".into()));
        }

        let claims = LicenseClaims::new(
            subscriber,
            request.tier,
            Utc::now().timestamp(),
            request.validity_days,
            max_devices,
            request.purchase_ref.as_deref(),
        );

        let code = self.codec.encode(&claims).map_err(|e| match e {
            CodecError::FieldTooLong { .. } => AppError::BadRequest(e.to_string()),
            other => AppError::Codec(other),
        })?;

        let license = queries::create_license(conn, &code, &claims)?;

        tracing::info!(
            license_id = %license.id,
            tier = %license.tier,
            max_devices = license.max_devices,
            code_prefix = %code_prefix(&license.code),
            "License minted"
        );

        Ok(license)
    }

    /// Send the activation email for a committed license, bounded by the
    /// configured timeout. Never fails.
    pub async fn notify_issued(&self, license: &License) -> NotificationOutcome {
        if !license.subscriber.contains('@') {
            tracing::debug!(license_id = %license.id, "Subscriber is not an email address, skipping notification");
            return NotificationOutcome::Skipped;
        }

        let message = ActivationEmail {
            app_name: &self.app_name,
            code: &license.code,
            tier: license.tier,
            expires_at: license.expires_at,
            max_devices: license.max_devices,
        }
        .render();

        let send = self.email.send_message(&license.subscriber, &message);
        match tokio::time::timeout(self.notify_timeout, send).await {
            Ok(Ok(EmailSendResult::Sent | EmailSendResult::WebhookCalled)) => {
                NotificationOutcome::Sent
            }
            Ok(Ok(EmailSendResult::Logged)) => NotificationOutcome::Skipped,
            Ok(Err(e)) => {
                tracing::warn!(license_id = %license.id, error = %e, "Activation email failed");
                NotificationOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    license_id = %license.id,
                    timeout_secs = self.notify_timeout.as_secs(),
                    "Activation email timed out"
                );
                NotificationOutcome::TimedOut
            }
        }
    }

    /// Verify a code for a device, binding the device on success.
    ///
    /// Order of checks: decode, embedded expiry, then the stored record's
    /// device slots (atomically with the bind).
    pub fn verify(
        &self,
        code: &str,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<VerificationResult> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(AppError::BadRequest("device_id is required".into()));
        }
        let device_name = device_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DEVICE_NAME);

        let cleaned = clean_code(code);
        let canonical = format_code(&cleaned);

        let claims = match self.codec.decode(&cleaned) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(code_prefix = %code_prefix(&canonical), error = %e, "Rejected malformed code");
                return Ok(VerificationResult::Invalid(Rejection::Malformed));
            }
        };

        let now = Utc::now().timestamp();
        if claims.is_expired(now) {
            tracing::debug!(code_prefix = %code_prefix(&canonical), "Rejected expired code");
            return Ok(VerificationResult::Invalid(Rejection::Expired));
        }

        let mut conn = self.db.get()?;
        match queries::bind_device_atomic(&mut conn, &canonical, device_id, device_name)? {
            BindOutcome::Bound {
                license,
                binding,
                refreshed,
            } => {
                tracing::info!(
                    license_id = %license.id,
                    binding_id = %binding.id,
                    refreshed,
                    "Device verified"
                );
                Ok(VerificationResult::Valid(verified(&license.claims(), now, true)))
            }
            BindOutcome::LimitReached { limit } => {
                tracing::info!(code_prefix = %code_prefix(&canonical), limit, "Device limit reached");
                Ok(VerificationResult::Invalid(Rejection::DeviceLimit { limit }))
            }
            BindOutcome::NotFound if self.allow_unregistered_codes => {
                tracing::warn!(code_prefix = %code_prefix(&canonical), "Accepted code with no license record");
                Ok(VerificationResult::Valid(verified(&claims, now, false)))
            }
            BindOutcome::NotFound => {
                tracing::info!(code_prefix = %code_prefix(&canonical), "Rejected code with no license record");
                Ok(VerificationResult::Invalid(Rejection::UnknownCode))
            }
        }
    }
}

fn verified(claims: &LicenseClaims, now: i64, registered: bool) -> VerifiedLicense {
    VerifiedLicense {
        subscriber: claims.subscriber.clone(),
        tier: claims.tier,
        expires_at: claims.expires_at,
        max_devices: claims.max_devices,
        days_remaining: claims.days_remaining(now),
        registered,
    }
}

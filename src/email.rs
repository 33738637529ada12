//! Email service for delivering activation codes.
//!
//! Supports three modes:
//! 1. Send via Resend API (when an API key is configured)
//! 2. POST to webhook URL (for DIY email delivery)
//! 3. Log only (no email sent)

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::{AppError, Result};
use crate::models::Tier;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// How an email was handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// Message was POSTed to the configured webhook URL
    WebhookCalled,
    /// No delivery configured; the message was only logged
    Logged,
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Fields shown in the activation email.
pub struct ActivationEmail<'a> {
    pub app_name: &'a str,
    pub code: &'a str,
    pub tier: Tier,
    pub expires_at: i64,
    pub max_devices: u32,
}

impl ActivationEmail<'_> {
    /// Render subject, HTML body and plain-text alternative.
    pub fn render(&self) -> EmailMessage {
        let tier = self.tier.display_name();
        let subject = format!("Your {} activation code - {} edition", self.app_name, tier);
        let expires = format_date(self.expires_at);
        let year = Utc::now().year();

        let text = format!(
            "Thank you for purchasing {app} {tier} edition.\n\nYour activation code:\n\n{code}\n\nValid until: {expires}\nDevices: up to {devices}\n\nOpen {app}, choose \"Activate\" and paste the code above.\n\n(c) {year} {app}",
            app = self.app_name,
            tier = tier,
            code = self.code,
            expires = expires,
            devices = self.max_devices,
            year = year,
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Thank you for purchasing {app}</h2>
<p>Your <strong>{tier}</strong> edition is ready. Here is your activation code:</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center; margin-bottom: 24px;">
<code style="font-size: 18px; font-weight: bold; letter-spacing: 1px; color: #333; word-break: break-all;">{code}</code>
</div>
<ul style="color: #666;">
<li>Valid until: <strong>{expires}</strong></li>
<li>Devices: up to <strong>{devices}</strong></li>
</ul>
<p>Open <strong>{app}</strong>, choose "Activate" and paste the code above.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">&copy; {year} {app}</p>
</body>
</html>"#,
            app = self.app_name,
            tier = tier,
            code = self.code,
            expires = expires,
            devices = self.max_devices,
            year = year,
        );

        EmailMessage {
            subject,
            html,
            text: Some(text),
        }
    }
}

/// Webhook payload sent when a webhook URL is configured.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: &'static str,
    pub email: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Outbound email. Cheap to clone.
#[derive(Clone)]
pub struct EmailService {
    resend_api_key: Option<String>,
    from_email: String,
    webhook_url: Option<String>,
    /// HTTP client for API calls
    http_client: Client,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            resend_api_key: config.resend_api_key.clone(),
            from_email: config.from_email.clone(),
            webhook_url: config.webhook_url.clone(),
            http_client: Client::new(),
        }
    }

    /// Service that only logs messages.
    pub fn log_only() -> Self {
        Self::new(&EmailConfig::default())
    }

    /// Send `html` to `to`. Failures are logged and reported as `false`.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> bool {
        let message = EmailMessage {
            subject: subject.to_string(),
            html: html.to_string(),
            text: None,
        };
        self.send_message(to, &message).await.is_ok()
    }

    /// Deliver a rendered message.
    ///
    /// Resolution order:
    /// 1. If a webhook URL is set -> POST to webhook
    /// 2. If a Resend API key is set -> send via Resend
    /// 3. Otherwise log only
    pub async fn send_message(&self, to: &str, message: &EmailMessage) -> Result<EmailSendResult> {
        if let Some(ref webhook_url) = self.webhook_url {
            let payload = WebhookPayload {
                event: "activation_email",
                email: to,
                subject: &message.subject,
                html: &message.html,
                text: message.text.as_deref(),
            };
            return self.call_webhook_with_retry(webhook_url, &payload).await;
        }

        let Some(ref api_key) = self.resend_api_key else {
            tracing::info!(
                to = %to,
                subject = %message.subject,
                "Email delivery not configured, message logged only"
            );
            return Ok(EmailSendResult::Logged);
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to],
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
        };

        self.send_request_with_retry(api_key, &request, to).await
    }

    /// Send a request to Resend API with exponential backoff retry.
    ///
    /// Retries on transient errors (network issues, 5xx, 429 rate limit).
    /// Fails immediately on non-transient errors (4xx except 429).
    async fn send_request_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            // Sleep before retry (skip on first attempt)
            if *delay_secs > 0 {
                tracing::warn!(
                    attempt,
                    delay_secs,
                    "Retrying email send after transient failure"
                );
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(attempt, to = %to_email, "Email sent successfully after retry");
                    } else {
                        tracing::info!(to = %to_email, "Email sent via Resend");
                    }
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            to = %to_email,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                (AppError::Internal(format!("Email service error: {}", e)), true)
            })?;

        let status = response.status();

        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                (AppError::Internal("Email service response error".into()), false)
            })?;
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            let is_transient = status.as_u16() == 429 || status.is_server_error();

            if is_transient {
                tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
            } else {
                tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
            }

            Err((
                AppError::Internal(format!("Email service error: {} - {}", status, body)),
                is_transient,
            ))
        }
    }

    /// Call the webhook URL with exponential backoff retry.
    ///
    /// Retries on transient errors (network issues, 5xx, 429 rate limit).
    async fn call_webhook_with_retry<T: Serialize>(
        &self,
        webhook_url: &str,
        payload: &T,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(
                    attempt,
                    delay_secs,
                    webhook_url = %webhook_url,
                    "Retrying webhook call after transient failure"
                );
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            let response = match self.http_client.post(webhook_url).json(payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, webhook_url = %webhook_url, "Email webhook request failed");
                    last_error = Some(AppError::Internal(format!("Email webhook error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                tracing::info!(webhook_url = %webhook_url, "Email webhook called");
                return Ok(EmailSendResult::WebhookCalled);
            }

            let error = AppError::Internal(format!("Email webhook returned {}", status));
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(error);
            } else {
                tracing::error!(status = %status, webhook_url = %webhook_url, "Email webhook rejected the message");
                return Err(error);
            }
        }

        tracing::error!(
            webhook_url = %webhook_url,
            attempts = RETRY_DELAYS.len() + 1,
            "Email webhook failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email webhook error: all retries exhausted".into())
        }))
    }
}

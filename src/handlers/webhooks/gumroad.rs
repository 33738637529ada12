use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::activation::NotificationOutcome;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::intake::{self, IntakeOutcome, PurchaseNotification};

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-gumroad-signature";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationOutcome>,
}

pub async fn handle_gumroad_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !intake::verify_signature(state.webhook_secret.as_deref(), &body, signature) {
        tracing::warn!("Rejected purchase webhook with invalid signature");
        return Err(AppError::Unauthorized);
    }

    let notification: PurchaseNotification = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse purchase webhook");
        AppError::BadRequest("Invalid JSON".into())
    })?;
    let raw_payload = String::from_utf8_lossy(&body);
    let event = notification.to_event(&raw_payload)?;

    let response = match intake::process_purchase(&state.activation, &event).await? {
        IntakeOutcome::Issued(issued) => WebhookResponse {
            success: true,
            message: "Activation code generated and sent",
            activation_code: Some(issued.license.code),
            license_id: Some(issued.license.id),
            notification: Some(issued.notification),
        },
        IntakeOutcome::AlreadyProcessed { license_id } => WebhookResponse {
            success: true,
            message: "Purchase already processed",
            activation_code: None,
            license_id,
            notification: None,
        },
    };

    Ok(Json(response))
}

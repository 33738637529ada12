use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::activation::{VerificationResult, VerifiedLicense};
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub activation_code: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Defaults to "Unknown Device"
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub message: String,
    /// Machine-readable rejection reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<VerifiedLicense>,
}

/// Every verification outcome is a 200; only a missing code or device id is a 400.
pub async fn verify_activation(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let code = req
        .activation_code
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Activation code is required".into()))?;
    let device_id = req
        .device_id
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Device id is required".into()))?;

    let response = match state
        .activation
        .verify(code, device_id, req.device_name.as_deref())?
    {
        VerificationResult::Valid(license) => VerifyResponse {
            valid: true,
            message: "Activation code is valid".to_string(),
            reason: None,
            data: Some(license),
        },
        VerificationResult::Invalid(rejection) => VerifyResponse {
            valid: false,
            message: rejection.to_string(),
            reason: Some(rejection.reason()),
            data: None,
        },
    };

    Ok(Json(response))
}

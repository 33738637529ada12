use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::activation::NotificationOutcome;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{DEFAULT_VALIDITY_DAYS, IssueLicense, Tier};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub email: Option<String>,
    /// personal | business | enterprise (default personal)
    #[serde(default)]
    pub product_type: Option<String>,
    /// Validity window in days (default 365)
    #[serde(default)]
    pub days: Option<i64>,
    /// Overrides the tier's device limit
    #[serde(default)]
    pub max_devices: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LicenseData {
    pub email: String,
    pub product_type: Tier,
    pub issued_at: i64,
    pub expires_at: i64,
    pub max_devices: u32,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub license_id: String,
    pub activation_code: String,
    pub data: LicenseData,
    pub notification: NotificationOutcome,
}

pub async fn generate_activation(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email is required".into()))?;

    let tier = match req.product_type.as_deref().map(str::trim) {
        None | Some("") => Tier::Personal,
        Some(raw) => raw
            .parse::<Tier>()
            .map_err(|_| AppError::BadRequest(format!("Unknown product_type: {}", raw)))?,
    };

    let request = IssueLicense {
        max_devices: req.max_devices,
        ..IssueLicense::new(email, tier, req.days.unwrap_or(DEFAULT_VALIDITY_DAYS))
    };

    let issued = state.activation.issue(&request).await?;
    let license = issued.license;

    Ok(Json(GenerateResponse {
        success: true,
        license_id: license.id,
        activation_code: license.code,
        data: LicenseData {
            email: license.subscriber,
            product_type: license.tier,
            issued_at: license.issued_at,
            expires_at: license.expires_at,
            max_devices: license.max_devices,
        },
        notification: issued.notification,
    }))
}

//! Purchase intake: turns sale notifications into issued licenses.
//!
//! A notification is recorded once per purchase id. The license is minted and
//! the event marked processed in one IMMEDIATE transaction, so redelivered or
//! concurrent notifications for the same purchase mint exactly one license.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::activation::{ActivationService, IssuedLicense};
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::codec::{MAX_PURCHASE_REF_LEN, MAX_SUBSCRIBER_LEN};
use crate::models::{CreatePurchaseEvent, DEFAULT_VALIDITY_DAYS, IssueLicense, Tier, UNLIMITED_DEVICES};

type HmacSha256 = Hmac<Sha256>;

/// Check an HMAC-SHA256 hex signature over the raw body.
///
/// With no secret configured every notification is authentic.
pub fn verify_signature(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    let Some(signature) = signature else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Length is not secret (always 64 hex chars for SHA-256)
    let provided = signature.trim().to_ascii_lowercase();
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Issuance parameters inferred from a product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchasePlan {
    pub tier: Tier,
    pub max_devices: u32,
    pub validity_days: i64,
}

/// Infer tier, device limit and validity from free-text product name.
///
/// "business" wins over "enterprise" when both appear.
pub fn infer_plan(product_name: &str) -> PurchasePlan {
    let name = product_name.to_lowercase();
    let tier = if name.contains("business") {
        Tier::Business
    } else if name.contains("enterprise") {
        Tier::Enterprise
    } else {
        Tier::Personal
    };
    match tier {
        Tier::Enterprise => PurchasePlan {
            tier,
            max_devices: UNLIMITED_DEVICES,
            validity_days: DEFAULT_VALIDITY_DAYS * 3,
        },
        _ => PurchasePlan {
            tier,
            max_devices: tier.device_limit(),
            validity_days: DEFAULT_VALIDITY_DAYS,
        },
    }
}

/// Sale notification body as sent by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseNotification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    /// Price in cents, as a number or numeric string
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PurchaseNotification {
    /// Validate required fields and build the event row.
    pub fn to_event(&self, raw_payload: &str) -> Result<CreatePurchaseEvent> {
        let purchase_id = non_blank(self.id.as_deref())
            .ok_or_else(|| AppError::BadRequest("Purchase id is required".into()))?;
        let buyer_email = non_blank(self.email.as_deref())
            .ok_or_else(|| AppError::BadRequest("Buyer email is required".into()))?;

        // Checked before recording, so an unmintable event is never stored
        if purchase_id.len() > MAX_PURCHASE_REF_LEN {
            return Err(AppError::BadRequest(format!(
                "Purchase id exceeds {} bytes",
                MAX_PURCHASE_REF_LEN
            )));
        }
        if buyer_email.len() > MAX_SUBSCRIBER_LEN {
            return Err(AppError::BadRequest(format!(
                "Buyer email exceeds {} bytes",
                MAX_SUBSCRIBER_LEN
            )));
        }

        Ok(CreatePurchaseEvent {
            purchase_id: purchase_id.to_string(),
            buyer_email: buyer_email.to_string(),
            product_name: self.product_name.clone().unwrap_or_default(),
            price_cents: self.price.as_ref().and_then(price_cents).unwrap_or(0),
            currency: self.currency.clone(),
            purchased_at: self.created_at.clone(),
            raw_payload: raw_payload.to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn price_cents(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Result of processing one notification.
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    /// A license was minted for this purchase.
    Issued(IssuedLicense),
    /// The purchase was already handled; nothing was minted.
    AlreadyProcessed { license_id: Option<String> },
}

/// Record the purchase and mint its license exactly once.
pub async fn process_purchase(
    service: &ActivationService,
    event: &CreatePurchaseEvent,
) -> Result<IntakeOutcome> {
    let license = {
        let mut conn = service.db().get()?;

        if !queries::record_purchase_event(&conn, event)? {
            tracing::debug!(purchase_id = %event.purchase_id, "Purchase event already recorded");
        }

        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let stored = queries::get_purchase_event(&tx, &event.purchase_id)?
            .ok_or_else(|| AppError::Internal("Purchase event missing after insert".into()))?;
        if stored.processed {
            tracing::info!(purchase_id = %event.purchase_id, "Duplicate purchase notification ignored");
            return Ok(IntakeOutcome::AlreadyProcessed {
                license_id: stored.license_id,
            });
        }

        let plan = infer_plan(&stored.product_name);
        let request = IssueLicense {
            subscriber: stored.buyer_email.clone(),
            tier: plan.tier,
            validity_days: plan.validity_days,
            max_devices: Some(plan.max_devices),
            purchase_ref: Some(stored.purchase_id.clone()),
        };

        let license = service.mint(&tx, &request)?;
        queries::mark_purchase_processed(&tx, &stored.purchase_id, &license.id)?;
        tx.commit()?;

        tracing::info!(
            purchase_id = %stored.purchase_id,
            license_id = %license.id,
            tier = %plan.tier,
            "Purchase processed"
        );
        license
    };

    let notification = service.notify_issued(&license).await;
    Ok(IntakeOutcome::Issued(IssuedLicense {
        license,
        notification,
    }))
}

use serde::{Deserialize, Serialize};

/// A received sale notification, stored for audit and idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub id: String,
    /// External purchase identifier (unique)
    pub purchase_id: String,
    pub buyer_email: String,
    pub product_name: String,
    pub price_cents: i64,
    pub currency: Option<String>,
    /// Purchase time as reported by the store
    pub purchased_at: Option<String>,
    /// Raw notification body
    pub raw_payload: String,
    pub processed: bool,
    pub processed_at: Option<i64>,
    /// License minted for this purchase
    pub license_id: Option<String>,
    pub received_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseEvent {
    pub purchase_id: String,
    pub buyer_email: String,
    pub product_name: String,
    pub price_cents: i64,
    pub currency: Option<String>,
    pub purchased_at: Option<String>,
    pub raw_payload: String,
}

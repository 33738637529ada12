use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

const SECONDS_PER_DAY: i64 = 86400;

/// Device limit used for tiers that are effectively unlimited.
pub const UNLIMITED_DEVICES: u32 = 999;

/// Default validity window for a new license.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Longest validity window a license may be issued with (100 years).
pub const MAX_VALIDITY_DAYS: i64 = 36500;

/// Product tier. Determines the default device limit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
    Personal,
    Business,
    Enterprise,
}

impl Tier {
    /// Default device limit for licenses of this tier.
    pub fn device_limit(self) -> u32 {
        match self {
            Tier::Personal => 3,
            Tier::Business | Tier::Enterprise => 10,
        }
    }

    /// Capitalized name for emails ("Personal", "Business", "Enterprise").
    pub fn display_name(self) -> &'static str {
        match self {
            Tier::Personal => "Personal",
            Tier::Business => "Business",
            Tier::Enterprise => "Enterprise",
        }
    }
}

/// The license terms carried inside an activation code.
///
/// Everything the server needs to validate a code is recoverable from the
/// code alone; the database record adds usage state on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseClaims {
    /// Subscriber identity, usually the purchase email
    pub subscriber: String,
    pub tier: Tier,
    pub issued_at: i64,
    /// Fixed at minting: issued_at + validity window
    pub expires_at: i64,
    pub max_devices: u32,
    /// External purchase identifier, for licenses minted from a sale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_ref: Option<String>,
}

impl LicenseClaims {
    /// Build claims for a license issued at `issued_at` and valid for `validity_days`.
    pub fn new(
        subscriber: &str,
        tier: Tier,
        issued_at: i64,
        validity_days: i64,
        max_devices: u32,
        purchase_ref: Option<&str>,
    ) -> Self {
        Self {
            subscriber: subscriber.to_string(),
            tier,
            issued_at,
            expires_at: issued_at.saturating_add(validity_days.saturating_mul(SECONDS_PER_DAY)),
            max_devices,
            purchase_ref: purchase_ref
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Whole days left until expiry, floored.
    pub fn days_remaining(&self, now: i64) -> i64 {
        (self.expires_at - now).div_euclid(SECONDS_PER_DAY)
    }
}

/// A persisted license: one row per issued code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    /// Display-formatted activation code (unique)
    pub code: String,
    pub subscriber: String,
    pub tier: Tier,
    pub issued_at: i64,
    pub expires_at: i64,
    pub max_devices: u32,
    pub purchase_ref: Option<String>,
    /// Set once, on the first successful verification
    pub used: bool,
    pub used_at: Option<i64>,
}

impl License {
    pub fn claims(&self) -> LicenseClaims {
        LicenseClaims {
            subscriber: self.subscriber.clone(),
            tier: self.tier,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            max_devices: self.max_devices,
            purchase_ref: self.purchase_ref.clone(),
        }
    }
}

/// Input for issuing a new license.
#[derive(Debug, Clone)]
pub struct IssueLicense {
    pub subscriber: String,
    pub tier: Tier,
    pub validity_days: i64,
    /// Overrides the tier's default device limit
    pub max_devices: Option<u32>,
    pub purchase_ref: Option<String>,
}

impl IssueLicense {
    pub fn new(subscriber: &str, tier: Tier, validity_days: i64) -> Self {
        Self {
            subscriber: subscriber.to_string(),
            tier,
            validity_days,
            max_devices: None,
            purchase_ref: None,
        }
    }

    pub fn effective_max_devices(&self) -> u32 {
        self.max_devices.unwrap_or_else(|| self.tier.device_limit())
    }
}

/// Short license listing for the admin stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RecentLicense {
    pub subscriber: String,
    pub tier: Tier,
    pub issued_at: i64,
}

/// Aggregate counters for the admin stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseStats {
    pub total_licenses: i64,
    pub used_licenses: i64,
    pub unused_licenses: i64,
    pub total_purchases: i64,
    pub processed_purchases: i64,
    pub recent_licenses: Vec<RecentLicense>,
}

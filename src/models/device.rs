use serde::{Deserialize, Serialize};

/// Display name recorded when the client does not send one.
pub const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

/// A device that has consumed one of a license's slots.
/// At most one row per (license_id, device_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub id: String,
    pub license_id: String,
    /// Client-supplied opaque identifier
    pub device_id: String,
    pub device_name: String,
    pub bound_at: i64,
    pub last_seen_at: i64,
    pub active: bool,
}

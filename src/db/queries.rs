use chrono::Utc;
use rusqlite::{Connection, ErrorCode, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    DEVICE_BINDING_COLS, LICENSE_COLS, PURCHASE_EVENT_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// True if `err` is a UNIQUE violation on `column` (e.g. "licenses.code").
fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation
                && msg.contains("UNIQUE")
                && msg.contains(column)
        }
        _ => false,
    }
}

// ============ Licenses ============

/// Persist a freshly minted license under `code`.
///
/// Returns `AppError::DuplicateCode` if the code already exists. The caller
/// must mint a new code rather than retry this one.
pub fn create_license(conn: &Connection, code: &str, claims: &LicenseClaims) -> Result<License> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO licenses (id, code, subscriber, tier, issued_at, expires_at, max_devices, purchase_ref, used, used_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL)",
        params![
            &id,
            code,
            &claims.subscriber,
            claims.tier.as_ref(),
            claims.issued_at,
            claims.expires_at,
            claims.max_devices,
            &claims.purchase_ref,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e, "licenses.code") {
            AppError::DuplicateCode
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(License {
        id,
        code: code.to_string(),
        subscriber: claims.subscriber.clone(),
        tier: claims.tier,
        issued_at: claims.issued_at,
        expires_at: claims.expires_at,
        max_devices: claims.max_devices,
        purchase_ref: claims.purchase_ref.clone(),
        used: false,
        used_at: None,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

/// Look up a license by its display-formatted code.
pub fn find_license_by_code(conn: &Connection, code: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE code = ?1", LICENSE_COLS),
        &[&code],
    )
}

/// Licenses minted for an external purchase.
pub fn list_licenses_by_purchase_ref(conn: &Connection, purchase_ref: &str) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE purchase_ref = ?1 ORDER BY issued_at",
            LICENSE_COLS
        ),
        &[&purchase_ref],
    )
}

/// Set the used flag. The first-use time is only written once.
pub fn mark_used(conn: &Connection, license_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET used = 1, used_at = COALESCE(used_at, ?1) WHERE id = ?2",
        params![now(), license_id],
    )?;
    Ok(affected > 0)
}

/// Hard-delete a license and, through the foreign key, its bindings.
pub fn delete_license(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM licenses WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ Device Bindings ============

pub fn count_active_devices(conn: &Connection, license_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM device_bindings WHERE license_id = ?1 AND active = 1",
        params![license_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn find_active_binding(
    conn: &Connection,
    license_id: &str,
    device_id: &str,
) -> Result<Option<DeviceBinding>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM device_bindings WHERE license_id = ?1 AND device_id = ?2 AND active = 1",
            DEVICE_BINDING_COLS
        ),
        &[&license_id, &device_id],
    )
}

pub fn list_bindings(conn: &Connection, license_id: &str) -> Result<Vec<DeviceBinding>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM device_bindings WHERE license_id = ?1 ORDER BY bound_at, id",
            DEVICE_BINDING_COLS
        ),
        &[&license_id],
    )
}

/// Insert a binding for (license, device), or refresh and reactivate the
/// existing one. Never creates a second row for the same pair.
pub fn upsert_device_binding(
    conn: &Connection,
    license_id: &str,
    device_id: &str,
    device_name: &str,
) -> Result<DeviceBinding> {
    let now = now();
    conn.execute(
        "INSERT INTO device_bindings (id, license_id, device_id, device_name, bound_at, last_seen_at, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
         ON CONFLICT(license_id, device_id) DO UPDATE SET
             device_name = excluded.device_name,
             last_seen_at = excluded.last_seen_at,
             active = 1",
        params![gen_id(), license_id, device_id, device_name, now],
    )?;

    query_one(
        conn,
        &format!(
            "SELECT {} FROM device_bindings WHERE license_id = ?1 AND device_id = ?2",
            DEVICE_BINDING_COLS
        ),
        &[&license_id, &device_id],
    )?
    .ok_or_else(|| AppError::Internal("Device binding missing after upsert".into()))
}

/// Outcome of [`bind_device_atomic`].
#[derive(Debug)]
pub enum BindOutcome {
    /// The device holds a slot on the license (new or refreshed).
    Bound {
        license: License,
        binding: DeviceBinding,
        /// The device already had an active binding before this call.
        refreshed: bool,
    },
    /// The license is at its device limit and the device has no slot.
    LimitReached { limit: u32 },
    /// No license is stored under this code.
    NotFound,
}

/// Check the device limit and bind the device in one IMMEDIATE transaction.
///
/// The write lock is taken at BEGIN, so two verifications at the limit
/// boundary cannot both see a free slot.
///
/// - Unused license: the first device always binds.
/// - Used license, device already active: binding is refreshed.
/// - Used license, new device: binds only while active bindings < max_devices.
pub fn bind_device_atomic(
    conn: &mut Connection,
    code: &str,
    device_id: &str,
    device_name: &str,
) -> Result<BindOutcome> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let Some(license) = find_license_by_code(&tx, code)? else {
        return Ok(BindOutcome::NotFound);
    };

    let mut refreshed = false;
    if license.used {
        if find_active_binding(&tx, &license.id, device_id)?.is_some() {
            refreshed = true;
        } else {
            let active = count_active_devices(&tx, &license.id)?;
            if active >= i64::from(license.max_devices) {
                return Ok(BindOutcome::LimitReached {
                    limit: license.max_devices,
                });
            }
        }
    }

    let binding = upsert_device_binding(&tx, &license.id, device_id, device_name)?;
    mark_used(&tx, &license.id)?;
    let license = get_license_by_id(&tx, &license.id)?
        .ok_or_else(|| AppError::Internal("License missing after bind".into()))?;

    tx.commit()?;

    Ok(BindOutcome::Bound {
        license,
        binding,
        refreshed,
    })
}

// ============ Purchase Events ============

/// Store a purchase notification. Returns false if the purchase id was
/// already recorded; the existing row is left untouched.
pub fn record_purchase_event(conn: &Connection, input: &CreatePurchaseEvent) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO purchase_events (id, purchase_id, buyer_email, product_name, price_cents, currency, purchased_at, raw_payload, processed, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
        params![
            gen_id(),
            &input.purchase_id,
            &input.buyer_email,
            &input.product_name,
            input.price_cents,
            &input.currency,
            &input.purchased_at,
            &input.raw_payload,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_purchase_event(conn: &Connection, purchase_id: &str) -> Result<Option<PurchaseEvent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchase_events WHERE purchase_id = ?1",
            PURCHASE_EVENT_COLS
        ),
        &[&purchase_id],
    )
}

/// Flip `processed` and link the minted license. Returns false if the event
/// was already processed (or does not exist).
pub fn mark_purchase_processed(
    conn: &Connection,
    purchase_id: &str,
    license_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE purchase_events SET processed = 1, processed_at = ?1, license_id = ?2
         WHERE purchase_id = ?3 AND processed = 0",
        params![now(), license_id, purchase_id],
    )?;
    Ok(affected > 0)
}

// ============ Stats ============

/// Aggregate counters plus the `recent_limit` most recently issued licenses.
pub fn license_stats(conn: &Connection, recent_limit: i64) -> Result<LicenseStats> {
    let (total_licenses, used_licenses): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(used), 0) FROM licenses",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let (total_purchases, processed_purchases): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(processed), 0) FROM purchase_events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let recent_licenses = query_all(
        conn,
        "SELECT subscriber, tier, issued_at FROM licenses ORDER BY issued_at DESC, rowid DESC LIMIT ?1",
        &[&recent_limit],
    )?;

    Ok(LicenseStats {
        total_licenses,
        used_licenses,
        unused_licenses: total_licenses - used_licenses,
        total_purchases,
        processed_purchases,
        recent_licenses,
    })
}

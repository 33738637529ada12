//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// Invalid values in the database surface as a column type error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENSE_COLS: &str =
    "id, code, subscriber, tier, issued_at, expires_at, max_devices, purchase_ref, used, used_at";

pub const DEVICE_BINDING_COLS: &str =
    "id, license_id, device_id, device_name, bound_at, last_seen_at, active";

pub const PURCHASE_EVENT_COLS: &str = "id, purchase_id, buyer_email, product_name, price_cents, currency, purchased_at, raw_payload, processed, processed_at, license_id, received_at";

// ============ FromRow Implementations ============

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            code: row.get(1)?,
            subscriber: row.get(2)?,
            tier: parse_enum(row, 3, "tier")?,
            issued_at: row.get(4)?,
            expires_at: row.get(5)?,
            max_devices: row.get(6)?,
            purchase_ref: row.get(7)?,
            used: row.get::<_, i32>(8)? != 0,
            used_at: row.get(9)?,
        })
    }
}

impl FromRow for DeviceBinding {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DeviceBinding {
            id: row.get(0)?,
            license_id: row.get(1)?,
            device_id: row.get(2)?,
            device_name: row.get(3)?,
            bound_at: row.get(4)?,
            last_seen_at: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
        })
    }
}

impl FromRow for PurchaseEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PurchaseEvent {
            id: row.get(0)?,
            purchase_id: row.get(1)?,
            buyer_email: row.get(2)?,
            product_name: row.get(3)?,
            price_cents: row.get(4)?,
            currency: row.get(5)?,
            purchased_at: row.get(6)?,
            raw_payload: row.get(7)?,
            processed: row.get::<_, i32>(8)? != 0,
            processed_at: row.get(9)?,
            license_id: row.get(10)?,
            received_at: row.get(11)?,
        })
    }
}

impl FromRow for RecentLicense {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RecentLicense {
            subscriber: row.get(0)?,
            tier: parse_enum(row, 1, "tier")?,
            issued_at: row.get(2)?,
        })
    }
}

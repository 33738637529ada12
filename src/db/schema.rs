use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Licenses (one row per issued activation code)
        -- code: display-formatted code, globally unique
        -- used/used_at: set once, on the first successful verification
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            subscriber TEXT NOT NULL,
            tier TEXT NOT NULL CHECK (tier IN ('personal', 'business', 'enterprise')),
            issued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            max_devices INTEGER NOT NULL CHECK (max_devices >= 1),
            purchase_ref TEXT,
            used INTEGER NOT NULL DEFAULT 0,
            used_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_issued ON licenses(issued_at DESC);
        CREATE INDEX IF NOT EXISTS idx_licenses_purchase ON licenses(purchase_ref);

        -- Device bindings (devices that consumed a license slot, never hard-deleted)
        CREATE TABLE IF NOT EXISTS device_bindings (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL,
            device_name TEXT NOT NULL,
            bound_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(license_id, device_id)
        );
        -- Note: UNIQUE(license_id, device_id) creates implicit index for device lookups
        CREATE INDEX IF NOT EXISTS idx_device_bindings_active ON device_bindings(license_id) WHERE active = 1;

        -- Purchase events (sale notifications, keyed by external purchase id)
        CREATE TABLE IF NOT EXISTS purchase_events (
            id TEXT PRIMARY KEY,
            purchase_id TEXT NOT NULL UNIQUE,
            buyer_email TEXT NOT NULL,
            product_name TEXT NOT NULL,
            price_cents INTEGER NOT NULL DEFAULT 0,
            currency TEXT,
            purchased_at TEXT,
            raw_payload TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER,
            license_id TEXT REFERENCES licenses(id) ON DELETE SET NULL,
            received_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_purchase_events_processed ON purchase_events(processed);
        "#,
    )?;
    Ok(())
}

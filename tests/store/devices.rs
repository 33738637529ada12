//! Tests for device bindings and the atomic check-and-bind.

use std::sync::{Arc, Barrier};

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn create_license(conn: &rusqlite::Connection, code: &str, max_devices: u32) -> License {
    let claims = LicenseClaims::new("a@example.com", Tier::Personal, 1_700_000_000, 365, max_devices, None);
    queries::create_license(conn, code, &claims).unwrap()
}

#[test]
fn test_upsert_refreshes_instead_of_duplicating() {
    let db = TestDb::new();
    let conn = db.conn();
    let license = create_license(&conn, "CODE-A", 3);

    let first = queries::upsert_device_binding(&conn, &license.id, "dev-1", "Laptop").unwrap();
    conn.execute(
        "UPDATE device_bindings SET active = 0, last_seen_at = 5 WHERE id = ?1",
        [&first.id],
    )
    .unwrap();
    assert_eq!(queries::count_active_devices(&conn, &license.id).unwrap(), 0);

    let second = queries::upsert_device_binding(&conn, &license.id, "dev-1", "Desktop").unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.bound_at, first.bound_at);
    assert!(second.active);
    assert!(second.last_seen_at >= first.last_seen_at);
    assert_eq!(second.device_name, "Desktop");

    assert_eq!(queries::list_bindings(&conn, &license.id).unwrap().len(), 1);
    assert_eq!(queries::count_active_devices(&conn, &license.id).unwrap(), 1);
}

#[test]
fn test_find_active_binding_ignores_inactive() {
    let db = TestDb::new();
    let conn = db.conn();
    let license = create_license(&conn, "CODE-B", 3);
    let binding = queries::upsert_device_binding(&conn, &license.id, "dev-1", "Laptop").unwrap();

    assert!(queries::find_active_binding(&conn, &license.id, "dev-1").unwrap().is_some());
    assert!(queries::find_active_binding(&conn, &license.id, "dev-2").unwrap().is_none());

    conn.execute("UPDATE device_bindings SET active = 0 WHERE id = ?1", [&binding.id])
        .unwrap();
    assert!(queries::find_active_binding(&conn, &license.id, "dev-1").unwrap().is_none());
}

#[test]
fn test_bind_first_use_marks_license_used() {
    let db = TestDb::new();
    let mut conn = db.conn();
    let license = create_license(&conn, "CODE-C", 1);

    match queries::bind_device_atomic(&mut conn, "CODE-C", "dev-1", "Laptop").unwrap() {
        queries::BindOutcome::Bound { license: bound, refreshed, .. } => {
            assert!(!refreshed);
            assert!(bound.used);
            assert!(bound.used_at.is_some());
            assert_eq!(bound.id, license.id);
        }
        other => panic!("expected Bound, got {:?}", other),
    }
}

#[test]
fn test_bind_enforces_limit_after_first_use() {
    let db = TestDb::new();
    let mut conn = db.conn();
    create_license(&conn, "CODE-D", 2);

    for device in ["dev-1", "dev-2"] {
        assert!(matches!(
            queries::bind_device_atomic(&mut conn, "CODE-D", device, "PC").unwrap(),
            queries::BindOutcome::Bound { refreshed: false, .. }
        ));
    }
    assert!(matches!(
        queries::bind_device_atomic(&mut conn, "CODE-D", "dev-3", "PC").unwrap(),
        queries::BindOutcome::LimitReached { limit: 2 }
    ));
    assert!(matches!(
        queries::bind_device_atomic(&mut conn, "CODE-D", "dev-1", "PC").unwrap(),
        queries::BindOutcome::Bound { refreshed: true, .. }
    ));
}

#[test]
fn test_bind_unknown_code() {
    let db = TestDb::new();
    let mut conn = db.conn();
    assert!(matches!(
        queries::bind_device_atomic(&mut conn, "NOPE", "dev-1", "PC").unwrap(),
        queries::BindOutcome::NotFound
    ));
}

#[test]
fn test_bind_device_atomic_concurrent() {
    // Threads race to bind distinct devices on a used license with one slot
    // left. The IMMEDIATE transaction must admit exactly one.
    let num_threads = 8;
    let db = TestDb::new();
    {
        let mut conn = db.conn();
        create_license(&conn, "CODE-E", 2);
        queries::bind_device_atomic(&mut conn, "CODE-E", "owner", "PC").unwrap();
    }

    let barrier = Arc::new(Barrier::new(num_threads));
    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let pool = db.pool.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().expect("thread failed to get connection");
                barrier.wait();
                matches!(
                    queries::bind_device_atomic(&mut conn, "CODE-E", &format!("dev-{}", i), "PC")
                        .unwrap(),
                    queries::BindOutcome::Bound { .. }
                )
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1, "exactly one thread should take the last slot");

    let license = queries::find_license_by_code(&db.conn(), "CODE-E").unwrap().unwrap();
    assert_eq!(queries::count_active_devices(&db.conn(), &license.id).unwrap(), 2);
}

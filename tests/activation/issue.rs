//! Tests for license issuance.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_issue_persists_decodable_license() {
    let db = TestDb::new();
    let service = test_service(&db);

    let issued = service
        .issue(&IssueLicense::new("buyer@example.com", Tier::Business, 30))
        .await
        .unwrap();
    let license = issued.license;

    assert_eq!(license.tier, Tier::Business);
    assert_eq!(license.max_devices, 10);
    assert_eq!(license.expires_at - license.issued_at, 30 * ONE_DAY);
    assert!(!license.used);

    let stored = queries::find_license_by_code(&db.conn(), &license.code)
        .unwrap()
        .unwrap();
    assert_eq!(stored, license);
    assert_eq!(service.codec().decode(&license.code).unwrap(), license.claims());
}

#[tokio::test]
async fn test_issue_without_delivery_skips_notification() {
    let db = TestDb::new();
    let service = test_service(&db);

    let issued = service
        .issue(&IssueLicense::new("buyer@example.com", Tier::Personal, 365))
        .await
        .unwrap();
    assert_eq!(issued.notification, NotificationOutcome::Skipped);
}

#[tokio::test]
async fn test_failed_notification_keeps_license() {
    let db = TestDb::new();
    let mut config = test_config();
    // Nothing listens on port 9 of the loopback interface
    config.email.webhook_url = Some("http://127.0.0.1:9/email".to_string());
    config.notify_timeout = std::time::Duration::from_millis(300);
    let service = test_service_with(&db, &config);

    let issued = service
        .issue(&IssueLicense::new("buyer@example.com", Tier::Personal, 365))
        .await
        .unwrap();

    assert!(matches!(
        issued.notification,
        NotificationOutcome::Failed | NotificationOutcome::TimedOut
    ));
    assert!(queries::get_license_by_id(&db.conn(), &issued.license.id)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_issue_honors_device_override() {
    let db = TestDb::new();
    let service = test_service(&db);

    let request = IssueLicense {
        max_devices: Some(1),
        ..IssueLicense::new("buyer@example.com", Tier::Enterprise, 365)
    };
    let issued = service.issue(&request).await.unwrap();
    assert_eq!(issued.license.max_devices, 1);
    assert_eq!(issued.license.tier, Tier::Enterprise);
}

#[test]
fn test_mint_rejects_invalid_requests() {
    let db = TestDb::new();
    let service = test_service(&db);
    let conn = db.conn();

    let cases = [
        IssueLicense::new("   ", Tier::Personal, 365),
        IssueLicense::new("buyer@example.com", Tier::Personal, 0),
        IssueLicense {
            max_devices: Some(0),
            ..IssueLicense::new("buyer@example.com", Tier::Personal, 365)
        },
        IssueLicense::new(&format!("{}@example.com", "x".repeat(MAX_SUBSCRIBER_LEN)), Tier::Personal, 365),
        IssueLicense::new("buyer@example.com", Tier::Personal, MAX_VALIDITY_DAYS + 1),
        IssueLicense::new("buyer@example.com", Tier::Personal, i64::MAX / 1000),
        IssueLicense::new("buyer@example.com", Tier::Personal, -5),
    ];

    for request in &cases {
        assert!(
            matches!(service.mint(&conn, request), Err(AppError::BadRequest(_))),
            "request should be rejected: {:?}",
            request
        );
    }
    assert_eq!(queries::license_stats(&conn, 10).unwrap().total_licenses, 0);
}

#[test]
fn test_mint_trims_subscriber_and_purchase_ref() {
    let db = TestDb::new();
    let service = test_service(&db);

    let request = IssueLicense {
        purchase_ref: Some("  sale_9 ".to_string()),
        ..IssueLicense::new("  buyer@example.com ", Tier::Personal, 365)
    };
    let license = service.mint(&db.conn(), &request).unwrap();
    assert_eq!(license.subscriber, "buyer@example.com");
    assert_eq!(license.purchase_ref.as_deref(), Some("sale_9"));
}

#[test]
fn test_mint_accepts_longest_validity() {
    let db = TestDb::new();
    let service = test_service(&db);

    let license = service
        .mint(&db.conn(), &IssueLicense::new("buyer@example.com", Tier::Personal, MAX_VALIDITY_DAYS))
        .unwrap();
    assert_eq!(license.expires_at - license.issued_at, MAX_VALIDITY_DAYS * ONE_DAY);
}

#[test]
fn test_tier_defaults_for_direct_issuance() {
    let db = TestDb::new();
    let service = test_service(&db);

    let cases = [
        (Tier::Personal, 3),
        (Tier::Business, 10),
        (Tier::Enterprise, 10),
    ];
    for (tier, devices) in cases {
        let license = create_test_license(&service, "buyer@example.com", tier, None);
        assert_eq!(license.max_devices, devices, "{}", tier);
    }
}

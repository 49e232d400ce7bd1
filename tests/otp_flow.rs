//! Integration tests for the OTP send/verify flow.

mod common;

use cerberus_auth::error::CoreError;
use cerberus_auth::state::ChannelType;
use cerberus_auth::RouteAction;
use chrono::Duration;
use common::test_core;

#[tokio::test]
async fn test_send_persists_hashes_only() {
    let (core, store, dispatcher, _) = test_core();

    let result = core.send_otp("email", "a@b.test").await.unwrap();
    assert!(result.sent);

    let code = dispatcher.last_code().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let records = store.otps();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.channel_type, ChannelType::Email);
    assert!(!record.verified);
    assert!(!record.used);
    // Neither the code nor the recipient appears in the record.
    assert!(!record.otp_hash.contains(&code));
    assert_ne!(record.channel_hash, "a@b.test");
    assert_eq!(record.expires_at, record.created_at + Duration::minutes(5));
}

#[tokio::test]
async fn test_verify_routes_new_user_to_register() {
    let (core, store, dispatcher, _) = test_core();

    core.send_otp("email", "a@b.test").await.unwrap();
    let code = dispatcher.last_code().unwrap();

    let response = core.verify_otp("a@b.test", &code).await.unwrap();
    assert!(response.verified);
    assert_eq!(response.action, Some(RouteAction::Register));
    assert_eq!(
        response.channel_did.as_deref(),
        Some(cerberus_auth::utils::sha256_hex("email:a@b.test").as_str())
    );
    let user_id = response.user_id.unwrap();
    assert!(user_id.starts_with("user_"));

    // The pending user and its verified primary channel exist.
    let users = store.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].did, user_id);
    assert_eq!(users[0].status, cerberus_auth::UserStatus::Pending);
    assert_eq!(users[0].roles.len(), 1);
    assert_eq!(users[0].roles[0].name, "registered");

    let channels = store.channels();
    assert_eq!(channels.len(), 1);
    assert!(channels[0].verified);
    assert!(channels[0].primary);
}

#[tokio::test]
async fn test_otp_replay_rejected() {
    let (core, _, dispatcher, _) = test_core();

    core.send_otp("email", "a@b.test").await.unwrap();
    let code = dispatcher.last_code().unwrap();

    let first = core.verify_otp("a@b.test", &code).await.unwrap();
    assert!(first.verified);

    let second = core.verify_otp("a@b.test", &code).await.unwrap();
    assert!(!second.verified);
    assert_eq!(second.message, "Invalid or already used");
    assert!(second.user_id.is_none());
}

#[tokio::test]
async fn test_expired_otp_rejected() {
    let (core, store, dispatcher, clock) = test_core();

    core.send_otp("email", "a@b.test").await.unwrap();
    let code = dispatcher.last_code().unwrap();

    clock.advance(Duration::minutes(6));

    let response = core.verify_otp("a@b.test", &code).await.unwrap();
    assert!(!response.verified);
    assert_eq!(response.message, "expired");

    // The audit trail carries the internal reason.
    let audits = store.audits();
    let failure = audits
        .iter()
        .find(|entry| entry.action == "otp.verify_failed")
        .unwrap();
    assert!(failure.details.contains("expired"));
}

#[tokio::test]
async fn test_wrong_code_is_noop_on_record() {
    let (core, store, dispatcher, _) = test_core();

    core.send_otp("email", "a@b.test").await.unwrap();
    let right = dispatcher.last_code().unwrap();
    let wrong = if right == "123456" { "654321" } else { "123456" };

    let response = core.verify_otp("a@b.test", wrong).await.unwrap();
    assert!(!response.verified);

    // Record untouched; the right code still verifies.
    let record = &store.otps()[0];
    assert!(!record.verified);
    assert!(!record.used);
    assert!(core.verify_otp("a@b.test", &right).await.unwrap().verified);
}

#[tokio::test]
async fn test_delivery_failure_keeps_record() {
    let (core, store, dispatcher, _) = test_core();

    dispatcher.fail_next_dispatches(1);
    let result = core.send_otp("email", "a@b.test").await.unwrap();
    assert!(!result.sent);

    // Record survives for audit and manual delivery; the code still
    // verifies.
    assert_eq!(store.otps().len(), 1);
    let code = dispatcher.last_code().unwrap();
    assert!(core.verify_otp("a@b.test", &code).await.unwrap().verified);
}

#[tokio::test]
async fn test_same_recipient_two_channels_two_identities() {
    let (core, _, dispatcher, _) = test_core();

    core.send_otp("email", "+15551234567").await.unwrap_err();

    core.send_otp("sms", "+15551234567").await.unwrap();
    let sms_code = dispatcher.last_code().unwrap();
    let sms = core.verify_otp("+15551234567", &sms_code).await.unwrap();
    assert!(sms.verified);

    core.send_otp("whatsapp", "+15551234567").await.unwrap();
    let wa_code = dispatcher.last_code().unwrap();
    let wa = core.verify_otp("+15551234567", &wa_code).await.unwrap();
    assert!(wa.verified);

    // The DID binds the channel, so the same number yields two
    // identities and two users.
    assert_ne!(sms.channel_did, wa.channel_did);
    assert_ne!(sms.user_id, wa.user_id);
}

#[tokio::test]
async fn test_input_validation() {
    let (core, _, _, _) = test_core();

    assert!(matches!(
        core.send_otp("fax", "a@b.test").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        core.send_otp("email", "not-an-email").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        core.verify_otp("a@b.test", "12345").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        core.verify_otp("a@b.test", "12345a").await,
        Err(CoreError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_used_implies_verified_invariant() {
    let (core, store, dispatcher, _) = test_core();

    for recipient in ["a@b.test", "c@d.test"] {
        core.send_otp("email", recipient).await.unwrap();
        let code = dispatcher.last_code().unwrap();
        core.verify_otp(recipient, &code).await.unwrap();
    }
    core.send_otp("email", "e@f.test").await.unwrap();

    for record in store.otps() {
        assert!(!record.used || record.verified, "used implies verified");
    }
}

#[tokio::test]
async fn test_audit_entries_for_send_and_verify() {
    let (core, store, dispatcher, _) = test_core();

    core.send_otp("email", "a@b.test").await.unwrap();
    let code = dispatcher.last_code().unwrap();
    core.verify_otp("a@b.test", &code).await.unwrap();

    let audits = store.audits();
    let actions: Vec<&str> = audits.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(
        actions.iter().filter(|a| **a == "otp.sent").count(),
        1,
        "exactly one otp.sent entry"
    );
    assert_eq!(
        actions.iter().filter(|a| **a == "otp.verified").count(),
        1,
        "exactly one otp.verified entry"
    );
    assert_eq!(
        actions.iter().filter(|a| **a == "user.registered").count(),
        1,
        "exactly one user.registered entry"
    );

    // Authentication events carry the 7-year retention.
    let sent = audits.iter().find(|e| e.action == "otp.sent").unwrap();
    assert_eq!(
        sent.retention_date,
        sent.timestamp + Duration::days(7 * 365)
    );
}

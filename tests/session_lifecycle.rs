//! Integration tests for session issue/validate/refresh/revoke.

mod common;

use cerberus_auth::config::SessionConfig;
use cerberus_auth::error::CoreError;
use chrono::Duration;
use common::{register_user, test_config, test_core, test_core_with_config};

/// Short-lived sessions for window arithmetic: TTL 3600s, window 600s.
fn short_session_config() -> cerberus_auth::CoreConfig {
    let mut config = test_config();
    config.session = SessionConfig::new(common::SECRET.into())
        .with_ttl_seconds(3_600)
        .with_refresh_window_seconds(600);
    config
}

#[tokio::test]
async fn test_issue_validate_round_trip() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;

    let issued = core
        .create_session(&user_id, &channel_did, "register")
        .await
        .unwrap();
    assert_eq!(issued.expires_at, issued.issued_at + Duration::seconds(86_400));

    let validation = core.validate_session(&issued.token).await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.user_id.as_deref(), Some(user_id.as_str()));
    assert_eq!(validation.expires_at, Some(issued.expires_at));

    // The stored record holds a hash, never the token.
    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_ne!(sessions[0].token_hash, issued.token);
    assert!(sessions[0].valid);
    assert!(sessions[0].last_used.is_some(), "validate touches last_used");
}

#[tokio::test]
async fn test_revocation_finality() {
    let (core, _, dispatcher, _) = test_core();
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "register")
        .await
        .unwrap();

    let outcome = core.revoke_session(&issued.token, "user logout").await.unwrap();
    assert!(outcome.revoked);

    assert!(!core.validate_session(&issued.token).await.unwrap().valid);
    assert!(matches!(
        core.refresh_session(&issued.token).await,
        Err(CoreError::Unauthorized)
    ));

    // Idempotent.
    assert!(core.revoke_session(&issued.token, "again").await.unwrap().revoked);
}

#[tokio::test]
async fn test_refresh_window_boundaries() {
    let (core, _, dispatcher, clock) = test_core_with_config(short_session_config());
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "signin")
        .await
        .unwrap();

    // t+100: well before the window opens at t+3000.
    clock.advance(Duration::seconds(100));
    assert!(matches!(
        core.refresh_session(&issued.token).await,
        Err(CoreError::Unauthorized)
    ));
    // The early attempt must not have killed the token.
    assert!(core.validate_session(&issued.token).await.unwrap().valid);

    // t+3100: inside the window.
    clock.advance(Duration::seconds(3_000));
    let refreshed = core.refresh_session(&issued.token).await.unwrap();
    assert!(refreshed.expires_at > issued.expires_at, "refresh monotonicity");

    // Old token dead, new token alive.
    assert!(!core.validate_session(&issued.token).await.unwrap().valid);
    let validation = core.validate_session(&refreshed.token).await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.user_id.as_deref(), Some(user_id.as_str()));
}

#[tokio::test]
async fn test_refresh_carries_extra_claims() {
    let (core, _, dispatcher, clock) = test_core_with_config(short_session_config());
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "signin")
        .await
        .unwrap();

    clock.advance(Duration::seconds(3_100));
    let refreshed = core.refresh_session(&issued.token).await.unwrap();

    // Both tokens carry the channelDID claim; decode by hand.
    for token in [&issued.token, &refreshed.token] {
        let payload = token.split('.').nth(1).unwrap();
        use base64::Engine;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(claims["channelDID"], channel_did.as_str());
        assert_eq!(claims["action"], "signin");
        assert_eq!(claims["sub"], user_id.as_str());
    }
}

#[tokio::test]
async fn test_expired_session_invalid() {
    let (core, _, dispatcher, clock) = test_core_with_config(short_session_config());
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "signin")
        .await
        .unwrap();

    clock.advance(Duration::seconds(3_601));
    assert!(!core.validate_session(&issued.token).await.unwrap().valid);
    assert!(matches!(
        core.refresh_session(&issued.token).await,
        Err(CoreError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_tampered_and_unknown_tokens_invalid() {
    let (core, _, dispatcher, _) = test_core();
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "register")
        .await
        .unwrap();

    // Flip the last signature character.
    let mut tampered = issued.token.clone();
    let last = if tampered.ends_with('A') { 'B' } else { 'A' };
    tampered.pop();
    tampered.push(last);
    assert!(!core.validate_session(&tampered).await.unwrap().valid);

    assert!(!core.validate_session("not-a-jwt").await.unwrap().valid);
}

#[tokio::test]
async fn test_create_session_rejects_unknown_inputs() {
    let (core, _, dispatcher, _) = test_core();
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;

    assert!(matches!(
        core.create_session(&user_id, &channel_did, "teleport").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        core.create_session("user_0_00000000", &channel_did, "signin").await,
        Err(CoreError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_session_audit_trail() {
    let (core, store, dispatcher, clock) = test_core_with_config(short_session_config());
    let (user_id, channel_did) = register_user(&core, &dispatcher, "a@b.test").await;
    let issued = core
        .create_session(&user_id, &channel_did, "signin")
        .await
        .unwrap();
    clock.advance(Duration::seconds(3_100));
    core.refresh_session(&issued.token).await.unwrap();

    let actions: Vec<String> = store
        .audits()
        .iter()
        .map(|entry| entry.action.clone())
        .collect();
    // Issue (x2: original + refresh mint), refresh, revoke of the old.
    assert_eq!(actions.iter().filter(|a| *a == "session.issued").count(), 2);
    assert_eq!(actions.iter().filter(|a| *a == "session.refreshed").count(), 1);
    assert_eq!(actions.iter().filter(|a| *a == "session.revoked").count(), 1);
}

//! Integration tests for WebAuthn registration and authentication
//! ceremonies, driven by a software authenticator.

mod common;

use cerberus_auth::error::CoreError;
use cerberus_auth::state::Severity;
use cerberus_auth::UserStatus;
use chrono::Duration;
use common::{
    b64, enroll_credential, register_user, test_core, TestAuthenticator, ORIGIN,
};

#[tokio::test]
async fn test_registration_challenge_options() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    let options = core
        .create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();

    assert_eq!(options.rp.id, common::RP_ID);
    assert_eq!(options.user.id, user_id);
    assert_eq!(options.timeout, 60_000);
    assert_eq!(options.attestation, "none");
    assert_eq!(options.pub_key_cred_params.len(), 2);
    assert_eq!(options.pub_key_cred_params[0].alg, -7);
    assert_eq!(options.pub_key_cred_params[1].alg, -257);
    // 32 random bytes, base64url unpadded: 43 chars.
    assert_eq!(options.challenge.len(), 43);

    let challenges = store.challenges();
    assert_eq!(challenges.len(), 1);
    assert_eq!(
        challenges[0].expires_at,
        challenges[0].created_at + Duration::minutes(5)
    );
}

#[tokio::test]
async fn test_registration_enrolls_and_activates() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    assert_eq!(store.users()[0].status, UserStatus::Pending);

    enroll_credential(&core, &user_id).await;

    // Credential stored, challenge consumed, user active.
    assert_eq!(store.credentials().len(), 1);
    assert_eq!(store.credentials()[0].user_id, user_id);
    assert!(store.challenges().is_empty(), "challenge deleted on success");
    assert_eq!(store.users()[0].status, UserStatus::Active);

    let enrolled = store
        .audits()
        .iter()
        .filter(|entry| entry.action == "webauthn.credential_enrolled")
        .count();
    assert_eq!(enrolled, 1);
}

#[tokio::test]
async fn test_wrong_origin_writes_no_credential() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    let authenticator = TestAuthenticator::new();
    let options = core
        .create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();
    let (client_data, attestation) =
        authenticator.attest(&options.challenge, "https://evil.example");

    let result = core
        .verify_webauthn_registration(&user_id, &options.challenge, &client_data, &attestation)
        .await;
    assert!(matches!(result, Err(CoreError::Unauthorized)));
    assert!(store.credentials().is_empty(), "no credential written");

    let failure = store
        .audits()
        .iter()
        .find(|entry| entry.action == "webauthn.verify_failed")
        .cloned()
        .unwrap();
    assert!(failure.details.contains("origin mismatch"));
}

#[tokio::test]
async fn test_rp_id_hash_mismatch_rejected() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    let authenticator = TestAuthenticator::new();
    let options = core
        .create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();
    let (client_data, attestation) =
        authenticator.attest_for_rp(&options.challenge, ORIGIN, "other.example");

    let result = core
        .verify_webauthn_registration(&user_id, &options.challenge, &client_data, &attestation)
        .await;
    assert!(matches!(result, Err(CoreError::Unauthorized)));
    assert!(store.credentials().is_empty());
}

#[tokio::test]
async fn test_challenge_is_single_use() {
    let (core, _, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    let authenticator = TestAuthenticator::new();
    let options = core
        .create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();
    let (client_data, attestation) = authenticator.attest(&options.challenge, ORIGIN);

    core.verify_webauthn_registration(&user_id, &options.challenge, &client_data, &attestation)
        .await
        .unwrap();

    // Same response again: the challenge record is gone.
    let replay = core
        .verify_webauthn_registration(&user_id, &options.challenge, &client_data, &attestation)
        .await;
    assert!(matches!(replay, Err(CoreError::Unauthorized)));
}

#[tokio::test]
async fn test_expired_challenge_rejected() {
    let (core, _, dispatcher, clock) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    let authenticator = TestAuthenticator::new();
    let options = core
        .create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();
    let (client_data, attestation) = authenticator.attest(&options.challenge, ORIGIN);

    clock.advance(Duration::minutes(6));

    let result = core
        .verify_webauthn_registration(&user_id, &options.challenge, &client_data, &attestation)
        .await;
    assert!(matches!(result, Err(CoreError::Unauthorized)));
}

#[tokio::test]
async fn test_authentication_issues_session() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    let authenticator = enroll_credential(&core, &user_id).await;

    let options = core
        .create_webauthn_authentication_challenge(&user_id)
        .await
        .unwrap();
    assert_eq!(options.rp_id, common::RP_ID);
    assert_eq!(options.allow_credentials.len(), 1);
    assert_eq!(
        options.allow_credentials[0].id,
        b64(&authenticator.credential_id)
    );

    let (client_data, auth_data, signature) = authenticator.assert(&options.challenge, ORIGIN, 1);
    let response = core
        .verify_webauthn_authentication(
            &user_id,
            &options.challenge,
            &client_data,
            &auth_data,
            &signature,
            Some(&user_id),
        )
        .await
        .unwrap();

    assert_eq!(response.credential_id, b64(&authenticator.credential_id));
    let validation = core.validate_session(&response.token).await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.user_id.as_deref(), Some(user_id.as_str()));

    // Counter advanced, challenge consumed.
    assert_eq!(store.credentials()[0].sign_count, 1);
    assert!(store.challenges().is_empty());
}

#[tokio::test]
async fn test_sign_counter_regression_is_replay() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    let authenticator = enroll_credential(&core, &user_id).await;

    // Legitimate assertion at counter 5.
    let options = core
        .create_webauthn_authentication_challenge(&user_id)
        .await
        .unwrap();
    let (client_data, auth_data, signature) = authenticator.assert(&options.challenge, ORIGIN, 5);
    core.verify_webauthn_authentication(
        &user_id,
        &options.challenge,
        &client_data,
        &auth_data,
        &signature,
        None,
    )
    .await
    .unwrap();
    assert_eq!(store.credentials()[0].sign_count, 5);

    // Clone replays counter 3: regression.
    let options = core
        .create_webauthn_authentication_challenge(&user_id)
        .await
        .unwrap();
    let (client_data, auth_data, signature) = authenticator.assert(&options.challenge, ORIGIN, 3);
    let result = core
        .verify_webauthn_authentication(
            &user_id,
            &options.challenge,
            &client_data,
            &auth_data,
            &signature,
            None,
        )
        .await;
    assert!(matches!(result, Err(CoreError::ChallengeReplay)));

    // Counter unchanged, WARN audit entry written.
    assert_eq!(store.credentials()[0].sign_count, 5);
    let warning = store
        .audits()
        .iter()
        .find(|entry| entry.action == "webauthn.replay_detected")
        .cloned()
        .unwrap();
    assert_eq!(warning.severity, Severity::Warn);
}

#[tokio::test]
async fn test_zero_counters_allowed() {
    let (core, store, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    let authenticator = enroll_credential(&core, &user_id).await;

    // Authenticators that never increment report zero on both sides.
    let options = core
        .create_webauthn_authentication_challenge(&user_id)
        .await
        .unwrap();
    let (client_data, auth_data, signature) = authenticator.assert(&options.challenge, ORIGIN, 0);
    core.verify_webauthn_authentication(
        &user_id,
        &options.challenge,
        &client_data,
        &auth_data,
        &signature,
        None,
    )
    .await
    .unwrap();
    assert_eq!(store.credentials()[0].sign_count, 0);
}

#[tokio::test]
async fn test_wrong_key_signature_rejected() {
    let (core, _, dispatcher, _) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    enroll_credential(&core, &user_id).await;

    // A different authenticator answers the challenge.
    let imposter = TestAuthenticator::new();
    let options = core
        .create_webauthn_authentication_challenge(&user_id)
        .await
        .unwrap();
    let (client_data, auth_data, signature) = imposter.assert(&options.challenge, ORIGIN, 1);

    let result = core
        .verify_webauthn_authentication(
            &user_id,
            &options.challenge,
            &client_data,
            &auth_data,
            &signature,
            None,
        )
        .await;
    assert!(matches!(result, Err(CoreError::Unauthorized)));
}

#[tokio::test]
async fn test_challenge_requires_known_user_and_credentials() {
    let (core, _, dispatcher, _) = test_core();

    assert!(matches!(
        core.create_webauthn_registration_challenge("user_0_ffffffff", "a", "A")
            .await,
        Err(CoreError::Unauthorized)
    ));

    // A pending user with no credentials cannot start authentication.
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;
    assert!(matches!(
        core.create_webauthn_authentication_challenge(&user_id).await,
        Err(CoreError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_purge_expired_challenges() {
    let (core, store, dispatcher, clock) = test_core();
    let (user_id, _) = register_user(&core, &dispatcher, "a@b.test").await;

    core.create_webauthn_registration_challenge(&user_id, "a", "A")
        .await
        .unwrap();
    assert_eq!(store.challenges().len(), 1);

    clock.advance(Duration::minutes(6));
    let removed = core.purge_expired_webauthn_challenges().await.unwrap();
    assert_eq!(removed, 1);
    assert!(store.challenges().is_empty());
}

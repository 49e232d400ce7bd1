//! Shared test harness: a fully mocked core plus a software
//! authenticator that produces real attestation and assertion
//! payloads (P-256 keys, CBOR attestation objects, DER signatures).

#![allow(dead_code)] // Not every test file uses every helper.

use cerberus_auth::config::{CoreConfig, SessionConfig, WebAuthnConfig};
use cerberus_auth::environment::CoreEnvironment;
use cerberus_auth::mocks::{MemoryGraphStore, MockClock, MockDispatcher};
use cerberus_auth::AuthCore;
use ciborium::Value;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

pub const RP_ID: &str = "example.com";
pub const RP_NAME: &str = "Example";
pub const ORIGIN: &str = "https://app.example.com";
pub const SECRET: &str = "test-signing-secret";

pub type TestCore = AuthCore<MemoryGraphStore, MockDispatcher, MockClock>;

/// Build a core over fresh mocks with the default configuration.
pub fn test_core() -> (TestCore, MemoryGraphStore, MockDispatcher, MockClock) {
    test_core_with_config(test_config())
}

/// Build a core over fresh mocks with a custom configuration.
pub fn test_core_with_config(
    config: CoreConfig,
) -> (TestCore, MemoryGraphStore, MockDispatcher, MockClock) {
    let store = MemoryGraphStore::new();
    store.seed_role("registered");
    let dispatcher = MockDispatcher::new();
    let clock = MockClock::new();

    let env = CoreEnvironment::new(
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
        config,
    )
    .unwrap();

    (AuthCore::new(env), store, dispatcher, clock)
}

pub fn test_config() -> CoreConfig {
    CoreConfig::new(
        SessionConfig::new(SECRET.into()),
        WebAuthnConfig::new(RP_ID.into(), RP_NAME.into(), ORIGIN.into()),
    )
}

/// Drive a fresh user through OTP verification and registration
/// routing; returns `(user_id, channel_did)`.
pub async fn register_user(
    core: &TestCore,
    dispatcher: &MockDispatcher,
    recipient: &str,
) -> (String, String) {
    core.send_otp("email", recipient).await.unwrap();
    let code = dispatcher.last_code().unwrap();
    let response = core.verify_otp(recipient, &code).await.unwrap();
    assert!(response.verified);
    (response.user_id.unwrap(), response.channel_did.unwrap())
}

/// Base64url without padding.
pub fn b64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// A software authenticator bound to one credential.
pub struct TestAuthenticator {
    signing_key: SigningKey,
    pub credential_id: Vec<u8>,
}

impl TestAuthenticator {
    pub fn new() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
            credential_id: b"test-credential-0001".to_vec(),
        }
    }

    fn cose_public_key(&self) -> Vec<u8> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (
                Value::Integer((-2).into()),
                Value::Bytes(point.x().unwrap().to_vec()),
            ),
            (
                Value::Integer((-3).into()),
                Value::Bytes(point.y().unwrap().to_vec()),
            ),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&map, &mut out).unwrap();
        out
    }

    fn auth_data(&self, rp_id: &str, flags: u8, sign_count: u32, attested: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
        out.push(flags);
        out.extend_from_slice(&sign_count.to_be_bytes());
        if attested {
            out.extend_from_slice(&[0u8; 16]); // aaguid
            out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&self.credential_id);
            out.extend_from_slice(&self.cose_public_key());
        }
        out
    }

    fn client_data(ceremony: &str, challenge: &str, origin: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": ceremony,
            "challenge": challenge,
            "origin": origin,
        }))
        .unwrap()
    }

    /// Produce `(clientDataJSON, attestationObject)` for a
    /// registration ceremony, both base64url.
    pub fn attest(&self, challenge: &str, origin: &str) -> (String, String) {
        self.attest_for_rp(challenge, origin, RP_ID)
    }

    /// Attestation against an arbitrary RP id (for mismatch tests).
    pub fn attest_for_rp(&self, challenge: &str, origin: &str, rp_id: &str) -> (String, String) {
        let client_data = Self::client_data("webauthn.create", challenge, origin);
        // UP | AT
        let auth_data = self.auth_data(rp_id, 0x41, 0, true);

        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_bytes).unwrap();

        (b64(&client_data), b64(&attestation_bytes))
    }

    /// Produce `(clientDataJSON, authenticatorData, signature)` for an
    /// authentication ceremony, all base64url.
    pub fn assert(
        &self,
        challenge: &str,
        origin: &str,
        sign_count: u32,
    ) -> (String, String, String) {
        let client_data = Self::client_data("webauthn.get", challenge, origin);
        // UP only
        let auth_data = self.auth_data(RP_ID, 0x01, sign_count, false);

        let mut message = auth_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data));
        let signature: DerSignature = self.signing_key.sign(&message);

        (b64(&client_data), b64(&auth_data), b64(signature.as_bytes()))
    }
}

impl Default for TestAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// Enroll a credential for `user_id`, returning the authenticator.
pub async fn enroll_credential(core: &TestCore, user_id: &str) -> TestAuthenticator {
    let authenticator = TestAuthenticator::new();
    let options = core
        .create_webauthn_registration_challenge(user_id, "user", "User")
        .await
        .unwrap();
    let (client_data, attestation) = authenticator.attest(&options.challenge, ORIGIN);
    let verification = core
        .verify_webauthn_registration(user_id, &options.challenge, &client_data, &attestation)
        .await
        .unwrap();
    assert_eq!(verification.credential_id, b64(&authenticator.credential_id));
    authenticator
}

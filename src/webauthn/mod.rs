//! WebAuthn engine.
//!
//! Runs the two WebAuthn ceremonies against store-backed challenge
//! records:
//!
//! - **Registration** (attestation): enroll a new credential and
//!   activate the owning user
//! - **Authentication** (assertion): prove possession of an enrolled
//!   credential
//!
//! # Replay resistance
//!
//! 1. Challenges are 32 CSPRNG bytes, single-use (deleted atomically on
//!    success) and expire after 5 minutes otherwise
//! 2. The assertion sign counter must be strictly increasing once
//!    either side is nonzero; regression is treated as a cloned
//!    authenticator and audited at WARN
//!
//! # Security
//!
//! Origin and RP-id binding are enforced on every verification:
//! `clientDataJSON.origin` must equal the configured origin and the
//! authenticator's `rpIdHash` must equal `SHA256(rpId)`. Verification
//! failures are opaque to the caller; the audit log carries the reason.

pub mod attestation;
pub mod cose;
pub mod options;

use crate::audit::AuditLog;
use crate::config::WebAuthnConfig;
use crate::constants::{audit_categories, node_types};
use crate::error::{CoreError, Result};
use crate::providers::{Clock, GraphStore};
use crate::state::{ChallengeType, Severity, WebAuthnChallenge, WebAuthnCredential};
use crate::utils::{b64url_decode, b64url_encode, sha256_bytes};
use attestation::{AttestationObject, AuthenticatorData, CollectedClientData};
use cose::CoseKey;
use options::{
    ALG_ES256, ALG_RS256, AuthenticationChallenge, AuthenticatorSelection, CredentialDescriptor,
    PubKeyCredParam, RegistrationChallenge, RpEntity, UserEntity,
};
use rand::RngCore;
use std::sync::Arc;

/// Result of a successful registration verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationVerification {
    /// Base64url credential id of the enrolled credential.
    pub credential_id: String,

    /// Whether this enrollment moved the user from `PENDING` to
    /// `ACTIVE`.
    pub user_activated: bool,
}

/// Result of a successful authentication verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationVerification {
    /// Base64url credential id that answered the challenge.
    pub credential_id: String,

    /// The counter value stored after this assertion.
    pub sign_count: u32,
}

/// WebAuthn engine.
pub struct WebAuthnEngine<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    store: S,
    clock: C,
    config: WebAuthnConfig,
    audit: Arc<AuditLog<S, C>>,
}

impl<S, C> WebAuthnEngine<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    /// Create a new WebAuthn engine.
    #[must_use]
    pub fn new(store: S, clock: C, config: WebAuthnConfig, audit: Arc<AuditLog<S, C>>) -> Self {
        Self {
            store,
            clock,
            config,
            audit,
        }
    }

    /// Issue a registration challenge for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the user does not exist,
    /// or a store error.
    pub async fn create_registration_challenge(
        &self,
        user_id: &str,
        username: &str,
        display_name: &str,
    ) -> Result<RegistrationChallenge> {
        if self.store.find_user(user_id).await?.is_none() {
            tracing::warn!(user_id, "registration challenge for unknown user");
            return Err(CoreError::Unauthorized);
        }

        let challenge = self.issue_challenge(user_id, ChallengeType::Registration).await?;
        let existing = self.store.credentials_for_user(user_id).await?;

        Ok(RegistrationChallenge {
            rp: RpEntity {
                id: self.config.rp_id.clone(),
                name: self.config.rp_name.clone(),
            },
            user: UserEntity {
                id: user_id.to_string(),
                name: username.to_string(),
                display_name: display_name.to_string(),
            },
            challenge,
            pub_key_cred_params: vec![
                PubKeyCredParam {
                    credential_type: "public-key",
                    alg: ALG_ES256,
                },
                PubKeyCredParam {
                    credential_type: "public-key",
                    alg: ALG_RS256,
                },
            ],
            timeout: self.config.timeout_millis,
            exclude_credentials: descriptors(&existing),
            authenticator_selection: AuthenticatorSelection {
                require_resident_key: false,
                user_verification: "preferred",
            },
            attestation: "none",
        })
    }

    /// Verify a registration response and enroll the credential.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for undecodable payloads
    /// and [`CoreError::Unauthorized`] for every verification failure;
    /// the audit log records which check failed.
    pub async fn verify_registration(
        &self,
        user_id: &str,
        challenge: &str,
        client_data_json: &str,
        attestation_object: &str,
    ) -> Result<RegistrationVerification> {
        let record = self
            .load_challenge(user_id, challenge, ChallengeType::Registration)
            .await?;

        let client_data_bytes = b64url_decode(client_data_json)?;
        let client_data = CollectedClientData::decode(&client_data_bytes)?;
        self.check_client_data(user_id, &client_data, "webauthn.create", challenge)
            .await?;

        let attestation_bytes = b64url_decode(attestation_object)?;
        let attestation = AttestationObject::parse(&attestation_bytes)?;
        if attestation.fmt != "none" {
            // We request attestation "none"; any other format would
            // arrive with a statement we have not verified.
            self.audit_failure(
                user_id,
                "unsupported attestation format",
                serde_json::json!({ "fmt": attestation.fmt }),
            )
            .await;
            return Err(CoreError::Unauthorized);
        }

        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        self.check_authenticator_data(user_id, &auth_data).await?;

        let Some(attested) = auth_data.attested_credential else {
            self.audit_failure(
                user_id,
                "attested credential data missing",
                serde_json::json!({}),
            )
            .await;
            return Err(CoreError::Unauthorized);
        };

        // Reject garbage key material now rather than at first use.
        CoseKey::decode(&attested.public_key_cose)?;

        let credential_id = b64url_encode(&attested.credential_id);
        let now = self.clock.now();
        let credential = WebAuthnCredential {
            uid: String::new(),
            user_id: user_id.to_string(),
            credential_id: credential_id.clone(),
            public_key: b64url_encode(&attested.public_key_cose),
            sign_count: auth_data.sign_count,
            transports: Vec::new(),
            added_at: now,
        };

        let credential_uid = match self.store.create_credential(credential).await {
            Ok(uid) => uid,
            Err(CoreError::UniqueViolation(_)) => {
                self.audit_failure(
                    user_id,
                    "credential id already enrolled",
                    serde_json::json!({ "credential_id": credential_id }),
                )
                .await;
                return Err(CoreError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        if !self.store.delete_challenge(&record.uid).await? {
            // A concurrent verifier consumed the challenge first.
            self.audit_failure(user_id, "challenge already consumed", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        let user_activated = self.store.activate_user(user_id, now).await?;

        tracing::info!(
            user_id,
            credential_id = %credential_id,
            user_activated,
            "WebAuthn credential enrolled"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "webauthn.credential_enrolled",
                node_types::WEBAUTHN_CREDENTIAL,
                &credential_uid,
                user_id,
                serde_json::json!({
                    "credential_id": credential_id,
                    "user_activated": user_activated,
                }),
            )
            .await;

        Ok(RegistrationVerification {
            credential_id,
            user_activated,
        })
    }

    /// Issue an authentication challenge for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the user has no enrolled
    /// credentials, or a store error.
    pub async fn create_authentication_challenge(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationChallenge> {
        let credentials = self.store.credentials_for_user(user_id).await?;
        if credentials.is_empty() {
            tracing::warn!(user_id, "authentication challenge with no credentials");
            return Err(CoreError::Unauthorized);
        }

        let challenge = self
            .issue_challenge(user_id, ChallengeType::Authentication)
            .await?;

        Ok(AuthenticationChallenge {
            challenge,
            timeout: self.config.timeout_millis,
            rp_id: self.config.rp_id.clone(),
            allow_credentials: descriptors(&credentials),
            user_verification: "preferred",
        })
    }

    /// Verify an assertion.
    ///
    /// The front door carries no credential id, so the signature is
    /// checked against each of the user's enrolled credentials; the
    /// first match answers.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for undecodable payloads,
    /// [`CoreError::ChallengeReplay`] on sign-counter regression, and
    /// [`CoreError::Unauthorized`] for every other failure.
    pub async fn verify_authentication(
        &self,
        user_id: &str,
        challenge: &str,
        client_data_json: &str,
        authenticator_data: &str,
        signature: &str,
        user_handle: Option<&str>,
    ) -> Result<AuthenticationVerification> {
        let record = self
            .load_challenge(user_id, challenge, ChallengeType::Authentication)
            .await?;

        if let Some(handle) = user_handle {
            if handle != user_id {
                self.audit_failure(user_id, "user handle mismatch", serde_json::json!({}))
                    .await;
                return Err(CoreError::Unauthorized);
            }
        }

        let client_data_bytes = b64url_decode(client_data_json)?;
        let client_data = CollectedClientData::decode(&client_data_bytes)?;
        self.check_client_data(user_id, &client_data, "webauthn.get", challenge)
            .await?;

        let auth_data_bytes = b64url_decode(authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        self.check_authenticator_data(user_id, &auth_data).await?;

        let signature_bytes = b64url_decode(signature)?;

        // Signature covers authenticatorData || SHA256(clientDataJSON).
        let mut message = auth_data_bytes.clone();
        message.extend_from_slice(&sha256_bytes(&client_data_bytes));

        let credentials = self.store.credentials_for_user(user_id).await?;
        let Some(credential) = credentials.into_iter().find(|credential| {
            b64url_decode(&credential.public_key)
                .ok()
                .and_then(|cose| CoseKey::decode(&cose).ok())
                .is_some_and(|key| key.verify(&message, &signature_bytes).is_ok())
        }) else {
            self.audit_failure(
                user_id,
                "signature did not match any enrolled credential",
                serde_json::json!({}),
            )
            .await;
            return Err(CoreError::Unauthorized);
        };

        let asserted = auth_data.sign_count;
        let stored = credential.sign_count;
        // Authenticators that never increment report zero on both
        // sides; anything else must be strictly increasing.
        if asserted != 0 || stored != 0 {
            if asserted <= stored {
                tracing::warn!(
                    user_id,
                    credential_id = %credential.credential_id,
                    asserted,
                    stored,
                    "sign counter regression, possible cloned authenticator"
                );
                metrics::counter!("webauthn_replay_detected").increment(1);
                self.audit
                    .emit_with_severity(
                        audit_categories::AUTHENTICATION,
                        "webauthn.replay_detected",
                        node_types::WEBAUTHN_CREDENTIAL,
                        &credential.uid,
                        user_id,
                        serde_json::json!({
                            "asserted_count": asserted,
                            "stored_count": stored,
                        }),
                        Severity::Warn,
                    )
                    .await;
                return Err(CoreError::ChallengeReplay);
            }
            self.store
                .update_sign_count(&credential.uid, asserted)
                .await?;
        }

        if !self.store.delete_challenge(&record.uid).await? {
            self.audit_failure(user_id, "challenge already consumed", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        tracing::info!(
            user_id,
            credential_id = %credential.credential_id,
            "WebAuthn assertion verified"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "webauthn.authenticated",
                node_types::WEBAUTHN_CREDENTIAL,
                &credential.uid,
                user_id,
                serde_json::json!({ "credential_id": credential.credential_id }),
            )
            .await;

        Ok(AuthenticationVerification {
            credential_id: credential.credential_id,
            sign_count: asserted.max(stored),
        })
    }

    /// Enrolled credentials for a user, for front-door listings.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn credentials_for_user(&self, user_id: &str) -> Result<Vec<WebAuthnCredential>> {
        self.store.credentials_for_user(user_id).await
    }

    /// Garbage-collect expired challenges. Returns how many were
    /// removed. Intended to be called periodically by the embedding
    /// application.
    ///
    /// # Errors
    ///
    /// Returns a store error if the purge fails.
    pub async fn purge_expired_challenges(&self) -> Result<u64> {
        let removed = self
            .store
            .purge_expired_challenges(self.clock.now())
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired WebAuthn challenges");
        }
        Ok(removed)
    }

    /// Generate, persist, and audit a fresh challenge.
    async fn issue_challenge(
        &self,
        user_id: &str,
        challenge_type: ChallengeType,
    ) -> Result<String> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let challenge = b64url_encode(&bytes);

        let now = self.clock.now();
        let uid = self
            .store
            .create_challenge(WebAuthnChallenge {
                uid: String::new(),
                challenge: challenge.clone(),
                user_id: user_id.to_string(),
                challenge_type,
                expires_at: now + self.config.challenge_expiry(),
                created_at: now,
            })
            .await?;

        tracing::info!(
            user_id,
            challenge_type = challenge_type.as_str(),
            "WebAuthn challenge issued"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "webauthn.challenge_issued",
                node_types::WEBAUTHN_CHALLENGE,
                &uid,
                user_id,
                serde_json::json!({ "type": challenge_type.as_str() }),
            )
            .await;

        Ok(challenge)
    }

    /// Load a challenge record and enforce its expiry.
    async fn load_challenge(
        &self,
        user_id: &str,
        challenge: &str,
        challenge_type: ChallengeType,
    ) -> Result<WebAuthnChallenge> {
        let Some(record) = self
            .store
            .find_challenge(challenge, user_id, challenge_type)
            .await?
        else {
            self.audit_failure(user_id, "challenge not found", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        };

        if self.clock.now() >= record.expires_at {
            self.audit_failure(user_id, "challenge expired", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        Ok(record)
    }

    /// Enforce ceremony type, challenge equality, and origin binding.
    async fn check_client_data(
        &self,
        user_id: &str,
        client_data: &CollectedClientData,
        expected_type: &str,
        expected_challenge: &str,
    ) -> Result<()> {
        if client_data.ceremony_type != expected_type {
            self.audit_failure(
                user_id,
                "unexpected clientData type",
                serde_json::json!({ "type": client_data.ceremony_type }),
            )
            .await;
            return Err(CoreError::Unauthorized);
        }

        // Equality modulo trailing padding; clients disagree on `=`.
        let got = client_data.challenge.trim_end_matches('=');
        let want = expected_challenge.trim_end_matches('=');
        if !constant_time_eq::constant_time_eq(got.as_bytes(), want.as_bytes()) {
            self.audit_failure(user_id, "challenge mismatch", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        if client_data.origin != self.config.origin {
            self.audit_failure(
                user_id,
                "origin mismatch",
                serde_json::json!({ "origin": client_data.origin }),
            )
            .await;
            return Err(CoreError::Unauthorized);
        }

        Ok(())
    }

    /// Enforce RP-id binding and user presence.
    async fn check_authenticator_data(
        &self,
        user_id: &str,
        auth_data: &AuthenticatorData,
    ) -> Result<()> {
        let expected = sha256_bytes(self.config.rp_id.as_bytes());
        if auth_data.rp_id_hash != expected {
            self.audit_failure(user_id, "rpIdHash mismatch", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        if !auth_data.user_present() {
            self.audit_failure(user_id, "user-present flag not set", serde_json::json!({}))
                .await;
            return Err(CoreError::Unauthorized);
        }

        Ok(())
    }

    async fn audit_failure(&self, user_id: &str, reason: &str, mut details: serde_json::Value) {
        if let Some(object) = details.as_object_mut() {
            object.insert("reason".into(), reason.into());
        }
        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "webauthn.verify_failed",
                node_types::WEBAUTHN_CHALLENGE,
                "",
                user_id,
                details,
            )
            .await;
    }
}

/// Map stored credentials to wire descriptors.
fn descriptors(credentials: &[WebAuthnCredential]) -> Vec<CredentialDescriptor> {
    credentials
        .iter()
        .map(|credential| CredentialDescriptor {
            credential_type: "public-key",
            id: credential.credential_id.clone(),
            transports: credential.transports.clone(),
        })
        .collect()
}

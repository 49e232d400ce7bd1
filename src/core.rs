//! Request-boundary facade.
//!
//! [`AuthCore`] wires the engines together and exposes one method per
//! front-door operation. The front door (GraphQL, HTTP, whatever the
//! embedding application runs) translates its requests onto these
//! methods one-to-one and never touches the engines directly.

use crate::audit::AuditLog;
use crate::environment::CoreEnvironment;
use crate::error::{CoreError, Result};
use crate::otp::{OtpEngine, OtpSendResult, OtpVerification};
use crate::providers::{Clock, GraphStore, MessageDispatcher};
use crate::router::{RouteAction, RouteDecision, Router};
use crate::session::{
    IssuedSession, RevocationOutcome, SessionEngine, SessionMetadata, SessionValidation,
};
use crate::state::{ChannelType, WebAuthnCredential};
use crate::webauthn::options::{AuthenticationChallenge, RegistrationChallenge};
use crate::webauthn::{RegistrationVerification, WebAuthnEngine};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Response to a `VerifyOTP` request.
///
/// Failure is a response, not an error: the caller learns only
/// `verified = false` plus a coarse message.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOtpResponse {
    /// Whether the code verified and was consumed.
    pub verified: bool,

    /// Caller-facing message.
    pub message: String,

    /// The routed user, when verified.
    pub user_id: Option<String>,

    /// Signin or register, when verified.
    pub action: Option<RouteAction>,

    /// Channel DID of the verified pair, when verified.
    pub channel_did: Option<String>,
}

/// Response to a `ValidateSession` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateSessionResponse {
    /// Whether the token is effectively valid.
    pub valid: bool,

    /// The session's user, when valid.
    pub user_id: Option<String>,

    /// The stored expiry, when valid.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response to a `VerifyWebAuthnAuthentication` request.
///
/// A verified assertion immediately establishes a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnSessionResponse {
    /// Credential that answered the challenge.
    pub credential_id: String,

    /// Uid of the established session.
    pub session_id: String,

    /// Bearer token for the established session.
    pub token: String,

    /// Session expiry.
    pub expires_at: DateTime<Utc>,
}

/// The authentication core.
///
/// Owns one engine per subsystem, all sharing the environment's store,
/// dispatcher, clock, and audit log.
pub struct AuthCore<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    store: S,
    audit: Arc<AuditLog<S, C>>,
    otp: OtpEngine<S, M, C>,
    router: Router<S, C>,
    webauthn: WebAuthnEngine<S, C>,
    session: SessionEngine<S, C>,
}

impl<S, M, C> AuthCore<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    /// Assemble the core from an environment.
    #[must_use]
    pub fn new(env: CoreEnvironment<S, M, C>) -> Self {
        let audit = Arc::new(AuditLog::new(
            env.store.clone(),
            env.clock.clone(),
            env.config.audit.clone(),
        ));

        let otp = OtpEngine::new(
            env.store.clone(),
            env.dispatcher.clone(),
            env.clock.clone(),
            env.config.otp.clone(),
            Arc::clone(&audit),
        );
        let router = Router::new(env.store.clone(), env.clock.clone(), Arc::clone(&audit));
        let webauthn = WebAuthnEngine::new(
            env.store.clone(),
            env.clock.clone(),
            env.config.webauthn.clone(),
            Arc::clone(&audit),
        );
        let session = SessionEngine::new(
            env.store.clone(),
            env.clock.clone(),
            env.config.session.clone(),
            Arc::clone(&audit),
        );

        Self {
            store: env.store,
            audit,
            otp,
            router,
            webauthn,
            session,
        }
    }

    /// The shared audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog<S, C> {
        &self.audit
    }

    // ═══════════════════════════════════════════════════════════
    // OTP
    // ═══════════════════════════════════════════════════════════

    /// `SendOTP{channel, recipient}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for an unknown channel or
    /// malformed recipient, or a store error.
    pub async fn send_otp(&self, channel: &str, recipient: &str) -> Result<OtpSendResult> {
        let channel_type = parse_channel(channel)?;
        self.otp.send(channel_type, recipient, "auth").await
    }

    /// `VerifyOTP{recipient, code}`.
    ///
    /// On success the router decides signin vs. register and its
    /// outcome is folded into the response.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed code, or a
    /// store error. Wrong and expired codes are responses, not errors.
    pub async fn verify_otp(&self, recipient: &str, code: &str) -> Result<VerifyOtpResponse> {
        match self.otp.verify(recipient, code).await? {
            OtpVerification::Invalid { message } => Ok(VerifyOtpResponse {
                verified: false,
                message: message.to_string(),
                user_id: None,
                action: None,
                channel_did: None,
            }),
            OtpVerification::Verified {
                channel_type,
                channel_did,
            } => {
                let decision = self.router.route(&channel_did, channel_type).await?;
                Ok(VerifyOtpResponse {
                    verified: true,
                    message: decision.message.clone(),
                    user_id: Some(decision.user_id),
                    action: Some(decision.action),
                    channel_did: Some(channel_did),
                })
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Routing
    // ═══════════════════════════════════════════════════════════

    /// `Route{channelDID, channelType}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for an unknown channel or
    /// malformed DID, [`CoreError::Unauthorized`] for a channel that
    /// must not authenticate, or a store error.
    pub async fn route(&self, channel_did: &str, channel_type: &str) -> Result<RouteDecision> {
        let channel_type = parse_channel(channel_type)?;
        self.router.route(channel_did, channel_type).await
    }

    // ═══════════════════════════════════════════════════════════
    // WebAuthn
    // ═══════════════════════════════════════════════════════════

    /// `CreateWebAuthnRegistrationChallenge{userId, username, displayName}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] for an unknown user, or a
    /// store error.
    pub async fn create_webauthn_registration_challenge(
        &self,
        user_id: &str,
        username: &str,
        display_name: &str,
    ) -> Result<RegistrationChallenge> {
        self.webauthn
            .create_registration_challenge(user_id, username, display_name)
            .await
    }

    /// `VerifyWebAuthnRegistration{userId, challenge, clientDataJSON, attestationObject}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for undecodable payloads,
    /// [`CoreError::Unauthorized`] for any verification failure, or a
    /// store error.
    pub async fn verify_webauthn_registration(
        &self,
        user_id: &str,
        challenge: &str,
        client_data_json: &str,
        attestation_object: &str,
    ) -> Result<RegistrationVerification> {
        self.webauthn
            .verify_registration(user_id, challenge, client_data_json, attestation_object)
            .await
    }

    /// `CreateWebAuthnAuthenticationChallenge{userId}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the user has no
    /// credentials, or a store error.
    pub async fn create_webauthn_authentication_challenge(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationChallenge> {
        self.webauthn.create_authentication_challenge(user_id).await
    }

    /// `VerifyWebAuthnAuthentication{userId, challenge, clientDataJSON,
    /// authenticatorData, signature, userHandle?}`.
    ///
    /// A verified assertion immediately issues a `webauthn` session.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for undecodable payloads,
    /// [`CoreError::ChallengeReplay`] on sign-counter regression,
    /// [`CoreError::Unauthorized`] for any other verification failure,
    /// or a store error.
    #[allow(clippy::too_many_arguments)]
    pub async fn verify_webauthn_authentication(
        &self,
        user_id: &str,
        challenge: &str,
        client_data_json: &str,
        authenticator_data: &str,
        signature: &str,
        user_handle: Option<&str>,
    ) -> Result<WebAuthnSessionResponse> {
        let verification = self
            .webauthn
            .verify_authentication(
                user_id,
                challenge,
                client_data_json,
                authenticator_data,
                signature,
                user_handle,
            )
            .await?;

        let mut claims = serde_json::Map::new();
        claims.insert(
            "credentialId".to_string(),
            verification.credential_id.clone().into(),
        );
        let issued = self
            .session
            .issue(
                user_id,
                crate::constants::auth_methods::WEBAUTHN,
                claims,
                SessionMetadata::default(),
            )
            .await?;

        Ok(WebAuthnSessionResponse {
            credential_id: verification.credential_id,
            session_id: issued.session_id,
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// Enrolled credentials for a user, for front-door listings.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn list_webauthn_credentials(
        &self,
        user_id: &str,
    ) -> Result<Vec<WebAuthnCredential>> {
        self.webauthn.credentials_for_user(user_id).await
    }

    /// Garbage-collect expired WebAuthn challenges.
    ///
    /// # Errors
    ///
    /// Returns a store error if the purge fails.
    pub async fn purge_expired_webauthn_challenges(&self) -> Result<u64> {
        self.webauthn.purge_expired_challenges().await
    }

    // ═══════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════

    /// `CreateSession{userId, channelDID, action}`.
    ///
    /// Issues a `passwordless` session carrying the channel DID and
    /// flow action as claims.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for an unknown action,
    /// [`CoreError::Unauthorized`] for an unknown user, or a store
    /// error.
    pub async fn create_session(
        &self,
        user_id: &str,
        channel_did: &str,
        action: &str,
    ) -> Result<IssuedSession> {
        if action != "signin" && action != "register" {
            return Err(CoreError::InvalidInput(format!("unknown action `{action}`")));
        }
        if self.user_missing(user_id).await? {
            return Err(CoreError::Unauthorized);
        }

        let mut claims = serde_json::Map::new();
        claims.insert("channelDID".to_string(), channel_did.into());
        claims.insert("action".to_string(), action.into());

        self.session
            .issue(
                user_id,
                crate::constants::auth_methods::PASSWORDLESS,
                claims,
                SessionMetadata::default(),
            )
            .await
    }

    /// `ValidateSession{token}`.
    ///
    /// Invalid tokens are a response, not an error; the caller never
    /// learns why.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn validate_session(&self, token: &str) -> Result<ValidateSessionResponse> {
        match self.session.validate(token).await {
            Ok(SessionValidation {
                user_id,
                expires_at,
            }) => Ok(ValidateSessionResponse {
                valid: true,
                user_id: Some(user_id),
                expires_at: Some(expires_at),
            }),
            Err(CoreError::Unauthorized) => Ok(ValidateSessionResponse {
                valid: false,
                user_id: None,
                expires_at: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// `RefreshSession{token}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the token is invalid or
    /// outside its refresh window, or a store error.
    pub async fn refresh_session(&self, token: &str) -> Result<IssuedSession> {
        self.session.refresh(token).await
    }

    /// `RevokeSession{token, reason}`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the mutation fails.
    pub async fn revoke_session(&self, token: &str, reason: &str) -> Result<RevocationOutcome> {
        self.session.revoke(token, reason).await
    }

    async fn user_missing(&self, user_id: &str) -> Result<bool> {
        Ok(self.store.find_user(user_id).await?.is_none())
    }
}

/// Parse a wire channel name.
fn parse_channel(channel: &str) -> Result<ChannelType> {
    ChannelType::parse(channel)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown channel `{channel}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("email").unwrap(), ChannelType::Email);
        assert!(matches!(
            parse_channel("fax"),
            Err(CoreError::InvalidInput(_))
        ));
    }
}

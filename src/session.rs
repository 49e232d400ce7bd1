//! Session engine.
//!
//! Mints, validates, refreshes, and revokes signed session tokens.
//!
//! # Token format
//!
//! HMAC-SHA256 JWT with claims `sub`, `iat`, `exp`, and
//! `jti = "{iat}-{sub}"`, plus caller-supplied extra claims that may
//! not shadow the standard set. The token itself never persists: the
//! store holds an [`AuthSession`] keyed by the token's SHA-256, which
//! carries the revocation flag and the authoritative expiry.
//!
//! # Expiry and the clock
//!
//! Signature verification is done by `jsonwebtoken` with its own
//! time-based checks disabled; expiry is enforced against the stored
//! record and the injected [`Clock`] so the whole lifecycle is
//! testable under clock travel.
//!
//! # Failure semantics
//!
//! Validate and Refresh never tell the caller whether a token never
//! existed, was revoked, or expired; all of it is
//! [`CoreError::Unauthorized`]. The audit log records the reason.

use crate::audit::AuditLog;
use crate::config::SessionConfig;
use crate::constants::{audit_categories, node_types};
use crate::error::{CoreError, Result};
use crate::providers::{Clock, GraphStore};
use crate::state::AuthSession;
use crate::utils::sha256_hex;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Claim names reserved for the envelope itself.
const STANDARD_CLAIMS: [&str; 4] = ["sub", "iat", "exp", "jti"];

/// JWT claim set.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: String,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// A freshly issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// The signed bearer token. Returned once, never stored.
    pub token: String,

    /// Uid of the session record.
    pub session_id: String,

    /// Issuance instant.
    pub issued_at: DateTime<Utc>,

    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// A successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionValidation {
    /// The session's user.
    pub user_id: String,

    /// The stored expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationOutcome {
    /// Whether a session record was found for the token.
    pub revoked: bool,

    /// When the revocation was processed.
    pub timestamp: DateTime<Utc>,
}

/// Client metadata captured at issuance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Client IP address.
    pub ip_address: Option<String>,

    /// Client user agent.
    pub user_agent: Option<String>,

    /// Device identifier.
    pub device_id: Option<String>,
}

/// Session engine.
pub struct SessionEngine<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    store: S,
    clock: C,
    config: SessionConfig,
    audit: Arc<AuditLog<S, C>>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl<S, C> SessionEngine<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    /// Create a new session engine.
    #[must_use]
    pub fn new(store: S, clock: C, config: SessionConfig, audit: Arc<AuditLog<S, C>>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced against the stored record and the
        // injected clock, not the library's wall clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        Self {
            store,
            clock,
            config,
            audit,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    /// Mint a token and persist its session record.
    ///
    /// Extra claims whose keys shadow the standard set are dropped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error; issuance has no
    /// authorization failures of its own.
    pub async fn issue(
        &self,
        user_id: &str,
        method: &str,
        extra_claims: serde_json::Map<String, serde_json::Value>,
        metadata: SessionMetadata,
    ) -> Result<IssuedSession> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.config.ttl();
        let iat = issued_at.timestamp();

        let mut extra = serde_json::Map::new();
        for (key, value) in extra_claims {
            if STANDARD_CLAIMS.contains(&key.as_str()) {
                tracing::warn!(claim = %key, "extra claim shadows a standard claim, dropping");
            } else {
                extra.insert(key, value);
            }
        }

        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: expires_at.timestamp(),
            jti: format!("{iat}-{user_id}"),
            extra,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CoreError::Serialization(format!("token encoding failed: {e}")))?;

        let session_id = self
            .store
            .create_session(AuthSession {
                uid: String::new(),
                user_id: user_id.to_string(),
                method: method.to_string(),
                token_hash: sha256_hex(&token),
                created_at: issued_at,
                expires_at,
                valid: true,
                last_used: None,
                ip_address: metadata.ip_address,
                user_agent: metadata.user_agent,
                device_id: metadata.device_id,
            })
            .await?;

        tracing::info!(user_id, method, session_id = %session_id, "session issued");

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "session.issued",
                node_types::AUTH_SESSION,
                &session_id,
                user_id,
                serde_json::json!({ "method": method }),
            )
            .await;

        Ok(IssuedSession {
            token,
            session_id,
            issued_at,
            expires_at,
        })
    }

    /// Validate a token against its stored record.
    ///
    /// On success the record's `last_used` is updated best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] for any invalid token.
    pub async fn validate(&self, token: &str) -> Result<SessionValidation> {
        let (_, session) = self.validate_inner(token).await?;

        let now = self.clock.now();
        if let Err(e) = self.store.touch_session(&session.token_hash, now).await {
            tracing::debug!(error = %e, "session last_used update failed");
        }

        Ok(SessionValidation {
            user_id: session.user_id,
            expires_at: session.expires_at,
        })
    }

    /// Exchange a token for a fresh one.
    ///
    /// Permitted only within the refresh window before expiry. The new
    /// token carries over the old token's non-standard claims; the old
    /// token is revoked with reason `refreshed`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the token is invalid or
    /// outside its refresh window.
    pub async fn refresh(&self, token: &str) -> Result<IssuedSession> {
        let (claims, session) = self.validate_inner(token).await?;

        let now = self.clock.now();
        let remaining = session.expires_at - now;
        if remaining > self.config.refresh_window() {
            self.audit_validation_failure(&session.uid, "refresh outside window")
                .await;
            return Err(CoreError::Unauthorized);
        }

        let metadata = SessionMetadata {
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            device_id: session.device_id.clone(),
        };
        let issued = self
            .issue(&session.user_id, &session.method, claims.extra, metadata)
            .await?;

        self.revoke(token, "refreshed").await?;

        tracing::info!(
            user_id = %session.user_id,
            old_session = %session.uid,
            new_session = %issued.session_id,
            "session refreshed"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "session.refreshed",
                node_types::AUTH_SESSION,
                &issued.session_id,
                &session.user_id,
                serde_json::json!({ "replaced": session.uid }),
            )
            .await;

        Ok(issued)
    }

    /// Revoke a token. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a store error if the mutation fails.
    pub async fn revoke(&self, token: &str, reason: &str) -> Result<RevocationOutcome> {
        let timestamp = self.clock.now();
        let token_hash = sha256_hex(token);
        let revoked = self.store.revoke_session(&token_hash, timestamp).await?;

        if revoked {
            tracing::info!(reason, "session revoked");
            self.audit
                .emit(
                    audit_categories::AUTHENTICATION,
                    "session.revoked",
                    node_types::AUTH_SESSION,
                    &token_hash,
                    "system",
                    serde_json::json!({ "reason": reason }),
                )
                .await;
        }

        Ok(RevocationOutcome { revoked, timestamp })
    }

    /// Signature-check a token and load its effective-valid record.
    async fn validate_inner(&self, token: &str) -> Result<(Claims, AuthSession)> {
        let decoded =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation);
        let claims = match decoded {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::warn!(error = %e, "token failed signature or structure check");
                self.audit_validation_failure("", "signature or structure invalid")
                    .await;
                return Err(CoreError::Unauthorized);
            }
        };

        let token_hash = sha256_hex(token);
        let Some(session) = self.store.find_session(&token_hash).await? else {
            self.audit_validation_failure("", "no session record").await;
            return Err(CoreError::Unauthorized);
        };

        if !session.valid {
            self.audit_validation_failure(&session.uid, "revoked").await;
            return Err(CoreError::Unauthorized);
        }

        if self.clock.now() >= session.expires_at {
            self.audit_validation_failure(&session.uid, "expired").await;
            return Err(CoreError::Unauthorized);
        }

        Ok((claims, session))
    }

    async fn audit_validation_failure(&self, object_id: &str, reason: &str) {
        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "session.validate_failed",
                node_types::AUTH_SESSION,
                object_id,
                "system",
                serde_json::json!({ "reason": reason }),
            )
            .await;
    }
}

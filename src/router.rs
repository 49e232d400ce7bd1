//! User-existence router.
//!
//! Given a freshly OTP-verified channel DID, decides whether the
//! caller signs in to an existing account or registers a new one, and
//! creates the pending user in the latter case.
//!
//! # State machine
//!
//! `PENDING --(first credential enrolled)--> ACTIVE --(admin)--> SUSPENDED`
//!
//! The router creates only `PENDING` users.

use crate::audit::AuditLog;
use crate::constants::{REGISTERED_ROLE, audit_categories, auth_methods, node_types};
use crate::error::{CoreError, Result};
use crate::providers::{Clock, GraphStore};
use crate::state::{ChannelType, User, UserChannel, UserStatus};
use std::sync::Arc;

/// Routing outcome for a verified channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    /// The channel belongs to an existing verified user.
    Signin,
    /// A pending user was just created for this channel.
    Register,
}

impl RouteAction {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Register => "register",
        }
    }
}

/// Routing decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    /// Whether a user exists for this channel. `true` on the register
    /// path too: the pending record was just created.
    pub user_exists: bool,

    /// Which flow the caller follows next.
    pub action: RouteAction,

    /// The user's application identifier.
    pub user_id: String,

    /// Authentication methods available to this user.
    pub available_methods: Vec<&'static str>,

    /// Hint for the front door's next request.
    pub next_step: &'static str,

    /// Human-readable summary.
    pub message: String,
}

/// User-existence router.
pub struct Router<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    store: S,
    clock: C,
    audit: Arc<AuditLog<S, C>>,
}

impl<S, C> Router<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    /// Create a new router.
    #[must_use]
    pub fn new(store: S, clock: C, audit: Arc<AuditLog<S, C>>) -> Self {
        Self {
            store,
            clock,
            audit,
        }
    }

    /// Route a verified channel DID to signin or registration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed DID,
    /// [`CoreError::Unauthorized`] when the channel exists but must
    /// not authenticate (unverified record, suspended user), or a
    /// store error.
    pub async fn route(
        &self,
        channel_did: &str,
        channel_type: ChannelType,
    ) -> Result<RouteDecision> {
        if channel_did.len() != 64 || !channel_did.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidInput(
                "channel DID must be a 64-char hex digest".into(),
            ));
        }

        match self.store.find_channel(channel_did, channel_type).await? {
            Some(channel) if channel.verified => self.signin(channel).await,
            // An unverified channel must not authenticate anyone;
            // fall through to pending-user creation.
            _ => self.register(channel_did, channel_type).await,
        }
    }

    async fn signin(&self, channel: UserChannel) -> Result<RouteDecision> {
        let user = self.store.find_user(&channel.user_id).await?;
        if user.is_some_and(|u| u.status == UserStatus::Suspended) {
            tracing::warn!(user_id = %channel.user_id, "suspended user attempted sign-in");
            self.audit
                .emit(
                    audit_categories::AUTHENTICATION,
                    "route.denied",
                    node_types::USER,
                    &channel.user_id,
                    &channel.user_id,
                    serde_json::json!({ "reason": "user suspended" }),
                )
                .await;
            return Err(CoreError::Unauthorized);
        }

        let now = self.clock.now();
        self.store.touch_channel(&channel.uid, now).await?;

        tracing::info!(
            user_id = %channel.user_id,
            channel = %channel.channel_type,
            "routing to sign-in"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "channel.signin",
                node_types::USER_CHANNEL,
                &channel.uid,
                &channel.user_id,
                serde_json::json!({ "channel": channel.channel_type.as_str() }),
            )
            .await;

        Ok(RouteDecision {
            user_exists: true,
            action: RouteAction::Signin,
            user_id: channel.user_id,
            available_methods: vec![auth_methods::WEBAUTHN, auth_methods::PASSWORDLESS],
            next_step: "authenticate",
            message: "User found, proceed to authentication".into(),
        })
    }

    async fn register(
        &self,
        channel_did: &str,
        channel_type: ChannelType,
    ) -> Result<RouteDecision> {
        let now = self.clock.now();
        let user_id = mint_user_id(now.timestamp(), channel_did);

        let roles = match self.store.find_role(REGISTERED_ROLE).await? {
            Some(role) => vec![role],
            None => {
                tracing::info!("role catalog has no `registered` role, creating user without");
                vec![]
            }
        };

        let user = User {
            uid: String::new(),
            status: UserStatus::Pending,
            did: user_id.clone(),
            created_at: now,
            updated_at: now,
            roles,
        };
        // The channel was OTP-verified moments ago, so the record is
        // born verified and primary.
        let channel = UserChannel {
            uid: String::new(),
            user_id: user_id.clone(),
            channel_type,
            channel_hash: channel_did.to_string(),
            verified: true,
            primary: true,
            created_at: now,
            last_used_at: None,
        };

        match self.store.create_pending_user(user, channel).await {
            Ok((user_uid, _)) => {
                tracing::info!(user_id = %user_id, "pending user created");
                self.audit
                    .emit(
                        audit_categories::AUTHENTICATION,
                        "user.registered",
                        node_types::USER,
                        &user_uid,
                        &user_id,
                        serde_json::json!({
                            "status": "PENDING",
                            "channel": channel_type.as_str(),
                        }),
                    )
                    .await;

                Ok(RouteDecision {
                    user_exists: true,
                    action: RouteAction::Register,
                    user_id,
                    available_methods: vec![auth_methods::WEBAUTHN],
                    next_step: "register",
                    message: "New user created, proceed to credential enrollment".into(),
                })
            }
            Err(CoreError::UniqueViolation(_)) => {
                // Lost a registration race; the winner's record decides.
                tracing::info!(
                    channel = %channel_type,
                    "concurrent registration detected, retrying lookup"
                );
                match self.store.find_channel(channel_did, channel_type).await? {
                    Some(existing) if existing.verified => self.signin(existing).await,
                    _ => Err(CoreError::Unauthorized),
                }
            }
            Err(e) => Err(e),
        }
    }
}

/// Mint a user identifier from the creation time and DID suffix.
fn mint_user_id(unix_seconds: i64, channel_did: &str) -> String {
    let suffix = &channel_did[channel_did.len().saturating_sub(8)..];
    format!("user_{unix_seconds}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_user_id_uses_did_suffix() {
        let did = "a".repeat(56) + "12345678";
        let user_id = mint_user_id(1_735_689_600, &did);
        assert_eq!(user_id, "user_1735689600_12345678");
    }

    #[test]
    fn test_route_action_strings() {
        assert_eq!(RouteAction::Signin.as_str(), "signin");
        assert_eq!(RouteAction::Register.as_str(), "register");
    }
}

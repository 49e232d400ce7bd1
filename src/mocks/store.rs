//! In-memory graph store for testing.

use crate::error::{CoreError, Result};
use crate::providers::GraphStore;
use crate::state::{
    AuditEntry, AuthSession, ChannelOtp, ChannelType, ChallengeType, Role, User, UserChannel,
    WebAuthnChallenge, WebAuthnCredential,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    otps: HashMap<String, ChannelOtp>,
    users: HashMap<String, User>,
    channels: HashMap<String, UserChannel>,
    challenges: HashMap<String, WebAuthnChallenge>,
    credentials: HashMap<String, WebAuthnCredential>,
    sessions: HashMap<String, AuthSession>,
    audits: Vec<AuditEntry>,
    roles: Vec<Role>,
    next_uid: u64,
    fail_audit_appends: u32,
}

impl Inner {
    fn mint_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("0x{:x}", self.next_uid)
    }
}

/// In-memory [`GraphStore`].
///
/// Enforces the same consistency contract as the production store:
/// unique `(channel_hash, channel_type)` and `credential_id` keys,
/// first-writer-wins OTP consumption, atomic challenge deletion.
/// All state lives behind one mutex, so every operation is trivially
/// linearizable.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<Mutex<Inner>>,
}

#[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
impl MemoryGraphStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a role into the read-only catalog.
    pub fn seed_role(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let uid = inner.mint_uid();
        inner.roles.push(Role {
            uid,
            name: name.to_string(),
        });
    }

    /// Make the next `n` audit appends fail with a transient error.
    pub fn fail_next_audit_appends(&self, n: u32) {
        self.inner.lock().unwrap().fail_audit_appends = n;
    }

    /// Snapshot of all OTP records.
    #[must_use]
    pub fn otps(&self) -> Vec<ChannelOtp> {
        self.inner.lock().unwrap().otps.values().cloned().collect()
    }

    /// Snapshot of all users.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.inner.lock().unwrap().users.values().cloned().collect()
    }

    /// Snapshot of all channels.
    #[must_use]
    pub fn channels(&self) -> Vec<UserChannel> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all pending challenges.
    #[must_use]
    pub fn challenges(&self) -> Vec<WebAuthnChallenge> {
        self.inner
            .lock()
            .unwrap()
            .challenges
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all credentials.
    #[must_use]
    pub fn credentials(&self) -> Vec<WebAuthnCredential> {
        self.inner
            .lock()
            .unwrap()
            .credentials
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<AuthSession> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of the audit trail, in append order.
    #[must_use]
    pub fn audits(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().audits.clone()
    }
}

#[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
impl GraphStore for MemoryGraphStore {
    async fn create_otp(&self, mut otp: ChannelOtp) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let uid = inner.mint_uid();
        otp.uid = uid.clone();
        inner.otps.insert(uid.clone(), otp);
        Ok(uid)
    }

    async fn find_unconsumed_otp(
        &self,
        channel_hash: &str,
        otp_hash: &str,
    ) -> Result<Option<ChannelOtp>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .otps
            .values()
            .find(|otp| {
                otp.channel_hash == channel_hash
                    && otp.otp_hash == otp_hash
                    && !otp.verified
                    && !otp.used
            })
            .cloned())
    }

    async fn consume_otp(&self, uid: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.otps.get_mut(uid) {
            Some(otp) if !otp.verified && !otp.used => {
                otp.verified = true;
                otp.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_channel(
        &self,
        channel_hash: &str,
        channel_type: ChannelType,
    ) -> Result<Option<UserChannel>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .channels
            .values()
            .find(|c| c.channel_hash == channel_hash && c.channel_type == channel_type)
            .cloned())
    }

    async fn create_pending_user(
        &self,
        mut user: User,
        mut channel: UserChannel,
    ) -> Result<(String, String)> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner
            .channels
            .values()
            .any(|c| c.channel_hash == channel.channel_hash && c.channel_type == channel.channel_type);
        if duplicate {
            return Err(CoreError::UniqueViolation("UserChannel(channelHash, channelType)"));
        }

        let user_uid = inner.mint_uid();
        let channel_uid = inner.mint_uid();
        user.uid = user_uid.clone();
        channel.uid = channel_uid.clone();
        inner.users.insert(user_uid.clone(), user);
        inner.channels.insert(channel_uid.clone(), channel);
        Ok((user_uid, channel_uid))
    }

    async fn touch_channel(&self, uid: &str, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(channel) = inner.channels.get_mut(uid) {
            channel.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.did == user_id).cloned())
    }

    async fn activate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        for user in inner.users.values_mut() {
            if user.did == user_id {
                if user.status == crate::state::UserStatus::Pending {
                    user.status = crate::state::UserStatus::Active;
                    user.updated_at = now;
                    return Ok(true);
                }
                return Ok(false);
            }
        }
        Ok(false)
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn create_challenge(&self, mut challenge: WebAuthnChallenge) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let uid = inner.mint_uid();
        challenge.uid = uid.clone();
        inner.challenges.insert(uid.clone(), challenge);
        Ok(uid)
    }

    async fn find_challenge(
        &self,
        challenge: &str,
        user_id: &str,
        challenge_type: ChallengeType,
    ) -> Result<Option<WebAuthnChallenge>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .challenges
            .values()
            .find(|c| {
                c.challenge == challenge
                    && c.user_id == user_id
                    && c.challenge_type == challenge_type
            })
            .cloned())
    }

    async fn delete_challenge(&self, uid: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.challenges.remove(uid).is_some())
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.challenges.len();
        inner.challenges.retain(|_, c| c.expires_at > now);
        Ok((before - inner.challenges.len()) as u64)
    }

    async fn create_credential(&self, mut credential: WebAuthnCredential) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner
            .credentials
            .values()
            .any(|c| c.credential_id == credential.credential_id);
        if duplicate {
            return Err(CoreError::UniqueViolation("WebAuthnCredential(credentialId)"));
        }

        let uid = inner.mint_uid();
        credential.uid = uid.clone();
        inner.credentials.insert(uid.clone(), credential);
        Ok(uid)
    }

    async fn credentials_for_user(&self, user_id: &str) -> Result<Vec<WebAuthnCredential>> {
        let inner = self.inner.lock().unwrap();
        let mut credentials: Vec<WebAuthnCredential> = inner
            .credentials
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credentials.sort_by(|a, b| a.added_at.cmp(&b.added_at));
        Ok(credentials)
    }

    async fn update_sign_count(&self, uid: &str, sign_count: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(credential) = inner.credentials.get_mut(uid) {
            credential.sign_count = sign_count;
        }
        Ok(())
    }

    async fn create_session(&self, mut session: AuthSession) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner
            .sessions
            .values()
            .any(|s| s.token_hash == session.token_hash);
        if duplicate {
            return Err(CoreError::UniqueViolation("AuthSession(tokenHash)"));
        }

        let uid = inner.mint_uid();
        session.uid = uid.clone();
        inner.sessions.insert(uid.clone(), session);
        Ok(uid)
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<AuthSession>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_session(&self, token_hash: &str, _now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        for session in inner.sessions.values_mut() {
            if session.token_hash == token_hash {
                session.valid = false;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn touch_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for session in inner.sessions.values_mut() {
            if session.token_hash == token_hash {
                session.last_used = Some(now);
            }
        }
        Ok(())
    }

    async fn append_audit(&self, mut entry: AuditEntry) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_audit_appends > 0 {
            inner.fail_audit_appends -= 1;
            return Err(CoreError::Transient("audit store unavailable".into()));
        }

        let uid = inner.mint_uid();
        entry.uid = uid.clone();
        inner.audits.push(entry);
        Ok(uid)
    }
}

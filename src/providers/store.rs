//! Graph store trait.
//!
//! Abstracts the backing graph database behind semantic operations.
//! The store is the only shared mutable state in the system; the
//! consistency contract lives in this trait so every implementation
//! (Dgraph in production, an in-memory map in tests) enforces it:
//!
//! - **OTP consumption** is first-writer-wins: for a given record the
//!   transition `{!verified, !used} -> {verified, used}` happens at
//!   most once; the loser of a race observes `false`.
//! - **`UserChannel`** insertion is unique on
//!   `(channel_hash, channel_type)`; a duplicate insert fails with
//!   [`CoreError::UniqueViolation`] and must not leave a partial user.
//! - **Challenge deletion** is atomic: exactly one caller observes
//!   `true` for a given record.
//! - **`WebAuthnCredential`** insertion is unique on `credential_id`.
//! - **Session revocation** is idempotent and linearizable against
//!   validation through the `valid` flag.
//!
//! Every method runs under the implementation's configured deadline.
//! A read that misses its deadline fails with [`CoreError::Timeout`];
//! a write whose request may already have reached the store fails with
//! [`CoreError::Indeterminate`] and must not be blindly retried.
//!
//! [`CoreError::UniqueViolation`]: crate::error::CoreError::UniqueViolation
//! [`CoreError::Timeout`]: crate::error::CoreError::Timeout
//! [`CoreError::Indeterminate`]: crate::error::CoreError::Indeterminate

use crate::error::Result;
use crate::state::{
    AuditEntry, AuthSession, ChannelOtp, ChannelType, ChallengeType, Role, User, UserChannel,
    WebAuthnChallenge, WebAuthnCredential,
};
use chrono::{DateTime, Utc};

/// Graph store operations.
///
/// Uids are opaque strings minted by the store and returned from every
/// create operation.
pub trait GraphStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════
    // ChannelOTP
    // ═══════════════════════════════════════════════════════════

    /// Persist a new OTP record, returning its uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or misses its deadline.
    async fn create_otp(&self, otp: ChannelOtp) -> Result<String>;

    /// Find the unique OTP record matching both hashes that is neither
    /// verified nor used.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_unconsumed_otp(
        &self,
        channel_hash: &str,
        otp_hash: &str,
    ) -> Result<Option<ChannelOtp>>;

    /// Atomically mark the record verified and used.
    ///
    /// Returns `false` if another verifier already consumed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn consume_otp(&self, uid: &str) -> Result<bool>;

    // ═══════════════════════════════════════════════════════════
    // User / UserChannel
    // ═══════════════════════════════════════════════════════════

    /// Look up a channel by its unique `(channel_hash, channel_type)` key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_channel(
        &self,
        channel_hash: &str,
        channel_type: ChannelType,
    ) -> Result<Option<UserChannel>>;

    /// Persist a new pending user together with its primary channel.
    ///
    /// Returns `(user_uid, channel_uid)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UniqueViolation`] if a channel with the
    /// same `(channel_hash, channel_type)` already exists; in that
    /// case neither node is created.
    ///
    /// [`CoreError::UniqueViolation`]: crate::error::CoreError::UniqueViolation
    async fn create_pending_user(
        &self,
        user: User,
        channel: UserChannel,
    ) -> Result<(String, String)>;

    /// Update a channel's `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn touch_channel(&self, uid: &str, now: DateTime<Utc>) -> Result<()>;

    /// Look up a user by application identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Transition a user from `PENDING` to `ACTIVE`.
    ///
    /// Returns `true` if the transition happened, `false` if the user
    /// was already active or suspended.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn activate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Resolve a role from the read-only catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_role(&self, name: &str) -> Result<Option<Role>>;

    // ═══════════════════════════════════════════════════════════
    // WebAuthnChallenge
    // ═══════════════════════════════════════════════════════════

    /// Persist a new challenge, returning its uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn create_challenge(&self, challenge: WebAuthnChallenge) -> Result<String>;

    /// Look up a challenge by `(challenge, user_id, type)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_challenge(
        &self,
        challenge: &str,
        user_id: &str,
        challenge_type: ChallengeType,
    ) -> Result<Option<WebAuthnChallenge>>;

    /// Delete a challenge record.
    ///
    /// Returns `true` only for the caller that actually removed it;
    /// a second deleter (or a verifier racing one) observes `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn delete_challenge(&self, uid: &str) -> Result<bool>;

    /// Remove every challenge whose expiry has passed. Returns the
    /// number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64>;

    // ═══════════════════════════════════════════════════════════
    // WebAuthnCredential
    // ═══════════════════════════════════════════════════════════

    /// Persist a new credential, returning its uid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UniqueViolation`] if the `credential_id`
    /// already exists.
    ///
    /// [`CoreError::UniqueViolation`]: crate::error::CoreError::UniqueViolation
    async fn create_credential(&self, credential: WebAuthnCredential) -> Result<String>;

    /// All credentials enrolled for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn credentials_for_user(&self, user_id: &str) -> Result<Vec<WebAuthnCredential>>;

    /// Store a credential's new sign counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn update_sign_count(&self, uid: &str, sign_count: u32) -> Result<()>;

    // ═══════════════════════════════════════════════════════════
    // AuthSession
    // ═══════════════════════════════════════════════════════════

    /// Persist a new session record, returning its uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn create_session(&self, session: AuthSession) -> Result<String>;

    /// Look up a session by token hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_session(&self, token_hash: &str) -> Result<Option<AuthSession>>;

    /// Set `valid = false` on the session with this token hash.
    ///
    /// Idempotent; returns `true` if a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn revoke_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Update a session's `last_used`. Best-effort: callers log and
    /// swallow failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation fails.
    async fn touch_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<()>;

    // ═══════════════════════════════════════════════════════════
    // AuditEntry
    // ═══════════════════════════════════════════════════════════

    /// Append an audit entry, returning its uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the audit log retries
    /// internally, callers are never failed by this.
    async fn append_audit(&self, entry: AuditEntry) -> Result<String>;
}

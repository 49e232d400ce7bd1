//! Persisted entity types.
//!
//! Every type here maps to a node type in the graph store; the serde
//! field names are the store predicates. Cross-entity references are
//! application identifiers (`user_id`) or store uids, never in-process
//! back-pointers: reads fetch only what an operation needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Channels
// ═══════════════════════════════════════════════════════════════════════

/// Delivery channel for one-time passcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Email delivery.
    Email,
    /// SMS delivery.
    Sms,
    /// WhatsApp delivery.
    Whatsapp,
    /// Telegram delivery.
    Telegram,
}

impl ChannelType {
    /// Stable string form, used in hashes and store predicates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
        }
    }

    /// Parse from the wire form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OTP
// ═══════════════════════════════════════════════════════════════════════

/// One-time passcode record.
///
/// Storage is hash-only: neither the recipient nor the code survives
/// in plaintext. Once `used` is set the record is terminal and kept
/// for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOtp {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// SHA-256 of the recipient address.
    pub channel_hash: String,

    /// Channel the code was sent over.
    pub channel_type: ChannelType,

    /// SHA-256 of the six-digit code.
    pub otp_hash: String,

    /// Set together with `used` on first successful verification.
    pub verified: bool,

    /// Terminal flag; a used record never verifies again.
    pub used: bool,

    /// Expiry instant (`created_at` + configured TTL).
    pub expires_at: DateTime<Utc>,

    /// Creation instant.
    pub created_at: DateTime<Utc>,

    /// Owning user, when known at send time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// What the code authorizes (default `"auth"`).
    pub purpose: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    /// Created by the router; no credential enrolled yet.
    Pending,
    /// At least one credential enrolled.
    Active,
    /// Disabled by an administrator.
    Suspended,
}

/// Role catalog entry. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Role name (e.g. `registered`).
    pub name: String,
}

/// User account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Lifecycle status. `PENDING` until a credential is enrolled.
    pub status: UserStatus,

    /// Application identifier (`user_<unixSeconds>_<didSuffix>`).
    pub did: String,

    /// Creation instant.
    pub created_at: DateTime<Utc>,

    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,

    /// Attached roles.
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Verified delivery channel bound to a user.
///
/// Unique per `(channel_hash, channel_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChannel {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Owning user's application identifier.
    pub user_id: String,

    /// Channel kind.
    pub channel_type: ChannelType,

    /// Channel fingerprint this record is keyed by.
    pub channel_hash: String,

    /// Whether ownership of the channel was proven. An unverified
    /// channel never authenticates anyone.
    pub verified: bool,

    /// Whether this is the user's primary channel.
    pub primary: bool,

    /// Creation instant.
    pub created_at: DateTime<Utc>,

    /// Updated on each successful sign-in that consumed this channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════
// WebAuthn
// ═══════════════════════════════════════════════════════════════════════

/// Which ceremony a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    /// Attestation (credential enrollment).
    Registration,
    /// Assertion (authentication).
    Authentication,
}

impl ChallengeType {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }
}

/// Pending WebAuthn challenge.
///
/// Single-use: deleted on successful consumption, garbage-collected
/// past expiry otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnChallenge {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// 32 CSPRNG bytes, base64url without padding.
    pub challenge: String,

    /// User the ceremony is for.
    pub user_id: String,

    /// Ceremony kind.
    pub challenge_type: ChallengeType,

    /// Expiry instant (`created_at` + configured TTL).
    pub expires_at: DateTime<Utc>,

    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// Enrolled WebAuthn credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnCredential {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Owning user's application identifier.
    pub user_id: String,

    /// Globally unique credential id, base64url without padding.
    pub credential_id: String,

    /// COSE-encoded public key, base64url without padding.
    pub public_key: String,

    /// Monotonically non-decreasing authenticator counter.
    pub sign_count: u32,

    /// Transport hints reported by the client (`usb`, `internal`, …).
    #[serde(default)]
    pub transports: Vec<String>,

    /// Enrollment instant.
    pub added_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════

/// Issued session record.
///
/// The signed token itself never persists; the record is keyed by its
/// hash. A session is effectively valid iff `valid && now < expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Owning user's application identifier.
    pub user_id: String,

    /// How the session was established (see [`crate::constants::auth_methods`]).
    pub method: String,

    /// SHA-256 of the issued token.
    pub token_hash: String,

    /// Issuance instant.
    pub created_at: DateTime<Utc>,

    /// Expiry instant.
    pub expires_at: DateTime<Utc>,

    /// `false` means revoked.
    pub valid: bool,

    /// Last successful validation instant (best-effort).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// Client IP captured at issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Client user agent captured at issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Device identifier captured at issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════

/// Audit severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Routine state transition.
    Info,
    /// Security-relevant anomaly.
    Warn,
}

/// Append-only audit record. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Store-minted node id.
    #[serde(default)]
    pub uid: String,

    /// Nanosecond-timestamp token (`audit_<unixNanos>`); tie-breaker
    /// for same-timestamp ordering.
    pub id: String,

    /// Retention category (see [`crate::constants::audit_categories`]).
    pub category: String,

    /// What happened (e.g. `otp.verified`).
    pub action: String,

    /// Entity type acted on.
    pub object_type: String,

    /// Entity identifier acted on.
    pub object_id: String,

    /// Acting principal (user id, or `system`).
    pub performed_by: String,

    /// When it happened.
    pub timestamp: DateTime<Utc>,

    /// JSON detail payload; carries the internal reason callers never see.
    pub details: String,

    /// Severity.
    pub severity: Severity,

    /// Emitting subsystem.
    pub source: String,

    /// `timestamp` + per-category retention policy.
    pub retention_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trip() {
        for ct in [
            ChannelType::Email,
            ChannelType::Sms,
            ChannelType::Whatsapp,
            ChannelType::Telegram,
        ] {
            assert_eq!(ChannelType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ChannelType::parse("carrier-pigeon"), None);
    }

    #[test]
    fn challenge_type_predicate() {
        let challenge = WebAuthnChallenge {
            uid: String::new(),
            challenge: "abc".into(),
            user_id: "user_1".into(),
            challenge_type: ChallengeType::Registration,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&challenge).unwrap();
        assert_eq!(json["challengeType"], "registration");
    }

    #[test]
    fn user_status_uppercase() {
        let json = serde_json::to_value(UserStatus::Pending).unwrap();
        assert_eq!(json, "PENDING");
    }
}

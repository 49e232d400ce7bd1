//! Constants used throughout the authentication core.

/// Authentication method identifiers recorded on sessions and in audit
/// entries.
pub mod auth_methods {
    /// One-time passcode over an out-of-band channel.
    pub const OTP: &str = "otp";

    /// WebAuthn/FIDO2 assertion.
    pub const WEBAUTHN: &str = "webauthn";

    /// Channel-verified passwordless sign-in (OTP + routing only).
    pub const PASSWORDLESS: &str = "passwordless";
}

/// Audit categories driving the retention policy.
pub mod audit_categories {
    /// Authentication state transitions. Retained 7 years by default.
    pub const AUTHENTICATION: &str = "authentication";

    /// Reads of personally identifying data. Retained 7 years by default.
    pub const PII_ACCESS: &str = "pii_access";

    /// Everything else. Retained 2 years by default.
    pub const GENERAL: &str = "general";
}

/// Message template identifiers handed to the dispatcher.
pub mod templates {
    /// OTP delivery over email.
    pub const OTP_EMAIL: &str = "otp_email";

    /// OTP delivery over SMS.
    pub const OTP_SMS: &str = "otp_sms";

    /// OTP delivery over WhatsApp.
    pub const OTP_WHATSAPP: &str = "otp_whatsapp";

    /// OTP delivery over Telegram.
    pub const OTP_TELEGRAM: &str = "otp_telegram";
}

/// Graph node type names, stored on every node as `dgraph.type`.
pub mod node_types {
    /// One-time passcode record.
    pub const CHANNEL_OTP: &str = "ChannelOTP";

    /// User account.
    pub const USER: &str = "User";

    /// Verified delivery channel bound to a user.
    pub const USER_CHANNEL: &str = "UserChannel";

    /// Pending WebAuthn challenge.
    pub const WEBAUTHN_CHALLENGE: &str = "WebAuthnChallenge";

    /// Enrolled WebAuthn credential.
    pub const WEBAUTHN_CREDENTIAL: &str = "WebAuthnCredential";

    /// Issued session record.
    pub const AUTH_SESSION: &str = "AuthSession";

    /// Append-only audit entry.
    pub const AUDIT_ENTRY: &str = "AuditEntry";

    /// Role catalog entry (read-only to this crate).
    pub const ROLE: &str = "Role";
}

/// Name of the role attached to newly registered users, when present
/// in the catalog.
pub const REGISTERED_ROLE: &str = "registered";

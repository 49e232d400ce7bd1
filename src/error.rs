//! Error types for the authentication core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error classes, independent of the concrete variant.
///
/// Callers branch on the class; the variant carries detail for logs
/// and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input. Not a security event.
    InputInvalid,
    /// Authentication or authorization failure. Opaque to the caller.
    Unauthorized,
    /// WebAuthn sign-counter regression (possible cloned authenticator).
    ChallengeReplay,
    /// Store or dispatcher unavailability. Safe to retry.
    Transient,
    /// A write may or may not have persisted. Do not blindly retry.
    Indeterminate,
    /// Configuration or invariant violation. Abort at startup.
    Fatal,
}

/// Error taxonomy for the authentication core.
///
/// Covers every failure mode the engines surface, organized by
/// category. Store-side error text never crosses the crate boundary
/// untranslated; callers see the variant message only.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    // ═══════════════════════════════════════════════════════════
    // Input Errors
    // ═══════════════════════════════════════════════════════════

    /// Malformed input (missing channel, bad base64, short code).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ═══════════════════════════════════════════════════════════
    // Authentication Errors
    // ═══════════════════════════════════════════════════════════

    /// Authentication failed.
    ///
    /// Deliberately opaque: wrong OTP, unknown credential, challenge
    /// mismatch, and revoked session all render identically. The
    /// audit log records the internal reason.
    #[error("authentication failed")]
    Unauthorized,

    /// WebAuthn sign counter went backwards.
    ///
    /// Indicates a cloned authenticator; audited at WARN severity.
    #[error("authentication failed")]
    ChallengeReplay,

    // ═══════════════════════════════════════════════════════════
    // Store Errors
    // ═══════════════════════════════════════════════════════════

    /// A unique constraint rejected a write. Carries the constraint
    /// name for internal handling; callers retry their lookup.
    #[error("duplicate record: {0}")]
    UniqueViolation(&'static str),

    /// A store or dispatcher call exceeded its deadline before the
    /// request reached the remote side.
    #[error("operation timed out")]
    Timeout,

    /// A write may or may not have persisted.
    #[error("operation outcome unknown")]
    Indeterminate,

    /// Store or dispatcher unavailable.
    #[error("service unavailable: {0}")]
    Transient(String),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════
    // Delivery Errors
    // ═══════════════════════════════════════════════════════════

    /// Outbound message delivery failed.
    #[error("message delivery failed: {0}")]
    Dispatch(String),

    // ═══════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// Configuration missing or invalid at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// The class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) => ErrorClass::InputInvalid,
            Self::Unauthorized => ErrorClass::Unauthorized,
            Self::ChallengeReplay => ErrorClass::ChallengeReplay,
            Self::UniqueViolation(_)
            | Self::Timeout
            | Self::Transient(_)
            | Self::Serialization(_)
            | Self::Dispatch(_) => ErrorClass::Transient,
            Self::Indeterminate => ErrorClass::Indeterminate,
            Self::Config(_) => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if this error is due to invalid user input.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns `true` if the caller may safely retry the operation.
    ///
    /// `Indeterminate` is deliberately excluded: a state-changing
    /// operation that may have landed must not be blindly replayed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }
}

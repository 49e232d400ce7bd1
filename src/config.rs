//! Core configuration.
//!
//! Configuration is injected at construction and never mutated at
//! runtime; there are no process-wide singletons. The embedding
//! application builds a [`CoreConfig`], calls [`CoreConfig::validate`]
//! at startup, and hands it to the environment.

use crate::error::{CoreError, Result};
use chrono::Duration;

/// Session token configuration.
#[derive(Clone)]
pub struct SessionConfig {
    /// Symmetric key for HMAC-SHA256 token signing. Must be non-empty.
    pub secret: String,

    /// Token time-to-live in seconds.
    ///
    /// Default: 86400 (24 hours)
    pub ttl_seconds: i64,

    /// Refresh window in seconds.
    ///
    /// Refresh is accepted only within this interval before expiry,
    /// which bounds the total lifetime a stolen token can extend.
    ///
    /// Default: 3600 (1 hour)
    pub refresh_window_seconds: i64,
}

impl SessionConfig {
    /// Create a session configuration with default TTLs.
    #[must_use]
    pub const fn new(secret: String) -> Self {
        Self {
            secret,
            ttl_seconds: 86_400,
            refresh_window_seconds: 3_600,
        }
    }

    /// Set the token time-to-live.
    #[must_use]
    pub const fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    /// Set the refresh window.
    #[must_use]
    pub const fn with_refresh_window_seconds(mut self, seconds: i64) -> Self {
        self.refresh_window_seconds = seconds;
        self
    }

    /// Token TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds)
    }

    /// Refresh window as a duration.
    #[must_use]
    pub const fn refresh_window(&self) -> Duration {
        Duration::seconds(self.refresh_window_seconds)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("refresh_window_seconds", &self.refresh_window_seconds)
            .finish()
    }
}

/// OTP configuration.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Code time-to-live in minutes.
    ///
    /// Default: 5
    pub expiry_minutes: i64,

    /// Number of decimal digits in a code.
    ///
    /// Default: 6
    pub digits: u32,
}

impl OtpConfig {
    /// Set the code time-to-live.
    #[must_use]
    pub const fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.expiry_minutes = minutes;
        self
    }

    /// Code TTL as a duration.
    #[must_use]
    pub const fn expiry(&self) -> Duration {
        Duration::minutes(self.expiry_minutes)
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 5,
            digits: 6,
        }
    }
}

/// WebAuthn relying-party configuration.
#[derive(Debug, Clone)]
pub struct WebAuthnConfig {
    /// Relying-party identifier (a DNS name, e.g. `example.com`).
    pub rp_id: String,

    /// Human-readable relying-party name.
    pub rp_name: String,

    /// Expected client origin (e.g. `https://app.example.com`).
    pub origin: String,

    /// Challenge time-to-live in minutes.
    ///
    /// Default: 5
    pub challenge_expiry_minutes: i64,

    /// Client-side ceremony timeout in milliseconds.
    ///
    /// Default: 60000
    pub timeout_millis: u64,
}

impl WebAuthnConfig {
    /// Create a relying-party configuration with default TTLs.
    #[must_use]
    pub const fn new(rp_id: String, rp_name: String, origin: String) -> Self {
        Self {
            rp_id,
            rp_name,
            origin,
            challenge_expiry_minutes: 5,
            timeout_millis: 60_000,
        }
    }

    /// Set the challenge time-to-live.
    #[must_use]
    pub const fn with_challenge_expiry_minutes(mut self, minutes: i64) -> Self {
        self.challenge_expiry_minutes = minutes;
        self
    }

    /// Challenge TTL as a duration.
    #[must_use]
    pub const fn challenge_expiry(&self) -> Duration {
        Duration::minutes(self.challenge_expiry_minutes)
    }
}

/// Audit retention configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Retention for `authentication` events, in years.
    ///
    /// Default: 7
    pub authentication_retention_years: i64,

    /// Retention for `pii_access` events, in years.
    ///
    /// Default: 7
    pub pii_retention_years: i64,

    /// Retention for all other categories, in years.
    ///
    /// Default: 2
    pub general_retention_years: i64,

    /// Bound on the in-process retry queue for failed audit writes.
    ///
    /// Default: 256
    pub retry_queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            authentication_retention_years: 7,
            pii_retention_years: 7,
            general_retention_years: 2,
            retry_queue_capacity: 256,
        }
    }
}

/// Graph store connection configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Store HTTP endpoint (e.g. `http://localhost:8080`).
    pub endpoint: String,

    /// API credential sent as the `X-Auth-Token` header.
    pub credential: String,

    /// Per-call deadline in milliseconds.
    ///
    /// Default: 5000
    pub timeout_millis: u64,
}

impl StoreConfig {
    /// Create a store configuration with the default deadline.
    #[must_use]
    pub const fn new(endpoint: String, credential: String) -> Self {
        Self {
            endpoint,
            credential,
            timeout_millis: 5_000,
        }
    }

    /// Set the per-call deadline.
    #[must_use]
    pub const fn with_timeout_millis(mut self, millis: u64) -> Self {
        self.timeout_millis = millis;
        self
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .field("timeout_millis", &self.timeout_millis)
            .finish()
    }
}

/// Top-level core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Session token configuration.
    pub session: SessionConfig,

    /// OTP configuration.
    pub otp: OtpConfig,

    /// WebAuthn relying-party configuration.
    pub webauthn: WebAuthnConfig,

    /// Audit retention configuration.
    pub audit: AuditConfig,
}

impl CoreConfig {
    /// Assemble a configuration from the required pieces, defaults for
    /// the rest.
    #[must_use]
    pub fn new(session: SessionConfig, webauthn: WebAuthnConfig) -> Self {
        Self {
            session,
            otp: OtpConfig::default(),
            webauthn,
            audit: AuditConfig::default(),
        }
    }

    /// Validate startup invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the HMAC secret is empty, the
    /// relying-party identity is incomplete, or a TTL is non-positive.
    /// These are fatal: abort the process rather than serve requests.
    pub fn validate(&self) -> Result<()> {
        if self.session.secret.is_empty() {
            return Err(CoreError::Config("session.secret must not be empty".into()));
        }
        if self.session.ttl_seconds <= 0 {
            return Err(CoreError::Config("session.ttlSeconds must be positive".into()));
        }
        if self.session.refresh_window_seconds <= 0 {
            return Err(CoreError::Config(
                "session.refreshWindowSeconds must be positive".into(),
            ));
        }
        // A refreshed token must expire strictly later than the one it
        // replaces, which needs the window inside the TTL.
        if self.session.refresh_window_seconds >= self.session.ttl_seconds {
            return Err(CoreError::Config(
                "session.refreshWindowSeconds must be smaller than session.ttlSeconds".into(),
            ));
        }
        if self.otp.expiry_minutes <= 0 {
            return Err(CoreError::Config("otp.expiryMinutes must be positive".into()));
        }
        if self.otp.digits != 6 {
            return Err(CoreError::Config(
                "otp.digits other than 6 is not supported".into(),
            ));
        }
        if self.webauthn.rp_id.is_empty() {
            return Err(CoreError::Config("webauthn.rpId must not be empty".into()));
        }
        if self.webauthn.origin.is_empty() {
            return Err(CoreError::Config("webauthn.origin must not be empty".into()));
        }
        Ok(())
    }
}

//! OTP engine.
//!
//! Generates, delivers, and verifies channel one-time passcodes.
//!
//! # Flow
//!
//! 1. Caller requests a code for a `(channel, recipient)` pair
//! 2. Draw a uniform six-digit code from the CSPRNG
//! 3. Persist hashes only (`H(recipient)`, `H(code)`) with a 5-minute TTL
//! 4. Dispatch the code over the channel's provider
//! 5. Caller submits recipient + code
//! 6. The unique unconsumed record matching both hashes is consumed
//!    atomically (first writer wins) and the channel DID is derived
//!
//! # Security
//!
//! - Codes never persist in plaintext and never leave the engine after
//!   `send` returns
//! - Single-use: the `{!verified, !used} -> {verified, used}` transition
//!   happens at most once per record
//! - Brute-force bound: 10⁻⁶ per attempt; per-recipient throttling is
//!   the front door's concern
//! - Verification never reveals whether the recipient or the code was
//!   wrong

use crate::audit::AuditLog;
use crate::config::OtpConfig;
use crate::constants::{audit_categories, node_types, templates};
use crate::error::{CoreError, Result};
use crate::providers::{Clock, GraphStore, MessageDispatcher};
use crate::state::{ChannelOtp, ChannelType};
use crate::utils::{channel_did, mask_recipient, sha256_hex, validate_recipient};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;

/// Result of a send operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpSendResult {
    /// Uid of the persisted record.
    pub otp_id: String,

    /// When the code stops being accepted.
    pub expires_at: DateTime<Utc>,

    /// Whether the provider accepted the message. `false` still leaves
    /// the record in place for audit and manual delivery.
    pub sent: bool,
}

/// Outcome of a verify operation.
///
/// Wrong, consumed, and expired codes are outcomes, not errors: the
/// caller gets `verified = false` with a human-readable message while
/// the audit log records the internal reason.
#[derive(Debug, Clone, PartialEq)]
pub enum OtpVerification {
    /// The code matched and was consumed.
    Verified {
        /// Channel the code was delivered over.
        channel_type: ChannelType,
        /// Channel DID for the verified `(channel, recipient)` pair.
        channel_did: String,
    },
    /// The code did not verify.
    Invalid {
        /// Caller-facing message.
        message: &'static str,
    },
}

/// OTP engine.
pub struct OtpEngine<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    store: S,
    dispatcher: M,
    clock: C,
    config: OtpConfig,
    audit: Arc<AuditLog<S, C>>,
}

impl<S, M, C> OtpEngine<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    /// Create a new OTP engine.
    #[must_use]
    pub fn new(
        store: S,
        dispatcher: M,
        clock: C,
        config: OtpConfig,
        audit: Arc<AuditLog<S, C>>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
            audit,
        }
    }

    /// Generate and deliver a code to `recipient` over `channel_type`.
    ///
    /// Persistence and delivery are both attempted: a provider
    /// rejection is reported via `sent = false` on the result while
    /// the record still exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed recipient,
    /// or a store error if persistence fails.
    pub async fn send(
        &self,
        channel_type: ChannelType,
        recipient: &str,
        purpose: &str,
    ) -> Result<OtpSendResult> {
        validate_recipient(channel_type, recipient)?;

        let code = self.generate_code();
        let now = self.clock.now();
        let expires_at = now + self.config.expiry();

        let otp = ChannelOtp {
            uid: String::new(),
            channel_hash: sha256_hex(recipient),
            channel_type,
            otp_hash: sha256_hex(&code),
            verified: false,
            used: false,
            expires_at,
            created_at: now,
            user_id: None,
            purpose: purpose.to_string(),
        };

        let otp_id = self.store.create_otp(otp).await?;

        let variables = serde_json::json!({
            "code": code,
            "expires_minutes": self.config.expiry_minutes.to_string(),
        });
        let sent = match self
            .dispatcher
            .dispatch(channel_type, recipient, template_for(channel_type), &variables)
            .await
        {
            Ok(receipt) if receipt.delivered => true,
            Ok(receipt) => {
                tracing::warn!(
                    channel = %channel_type,
                    recipient = %mask_recipient(recipient),
                    error = receipt.error.as_deref().unwrap_or("unknown"),
                    "OTP delivery rejected by provider"
                );
                metrics::counter!("otp_dispatch_failures").increment(1);
                false
            }
            Err(e) => {
                tracing::error!(
                    channel = %channel_type,
                    recipient = %mask_recipient(recipient),
                    error = %e,
                    "OTP delivery failed"
                );
                metrics::counter!("otp_dispatch_failures").increment(1);
                false
            }
        };

        tracing::info!(
            channel = %channel_type,
            recipient = %mask_recipient(recipient),
            otp_id = %otp_id,
            sent,
            "OTP issued"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "otp.sent",
                node_types::CHANNEL_OTP,
                &otp_id,
                "system",
                serde_json::json!({
                    "channel": channel_type.as_str(),
                    "purpose": purpose,
                    "sent": sent,
                }),
            )
            .await;

        Ok(OtpSendResult {
            otp_id,
            expires_at,
            sent,
        })
    }

    /// Verify a code for `recipient` and consume the record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a malformed code, or a
    /// store error. Wrong, consumed, and expired codes are reported
    /// through [`OtpVerification::Invalid`], not as errors.
    pub async fn verify(&self, recipient: &str, code: &str) -> Result<OtpVerification> {
        if code.len() != self.config.digits as usize
            || !code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(CoreError::InvalidInput(format!(
                "code must be {} digits",
                self.config.digits
            )));
        }

        let channel_hash = sha256_hex(recipient);
        let otp_hash = sha256_hex(code);

        let Some(record) = self
            .store
            .find_unconsumed_otp(&channel_hash, &otp_hash)
            .await?
        else {
            self.audit_verify_failure(recipient, "no matching unconsumed record")
                .await;
            return Ok(OtpVerification::Invalid {
                message: "Invalid or already used",
            });
        };

        // The store matched on both hashes; re-check in constant time
        // before consuming.
        if !constant_time_eq::constant_time_eq(
            record.otp_hash.as_bytes(),
            otp_hash.as_bytes(),
        ) {
            self.audit_verify_failure(recipient, "hash mismatch on candidate record")
                .await;
            return Ok(OtpVerification::Invalid {
                message: "Invalid or already used",
            });
        }

        let now = self.clock.now();
        if now >= record.expires_at {
            self.audit_verify_failure(recipient, "expired").await;
            return Ok(OtpVerification::Invalid { message: "expired" });
        }

        if !self.store.consume_otp(&record.uid).await? {
            // Another verifier won the race.
            self.audit_verify_failure(recipient, "lost consumption race")
                .await;
            return Ok(OtpVerification::Invalid {
                message: "Invalid or already used",
            });
        }

        let did = channel_did(record.channel_type, recipient);

        tracing::info!(
            channel = %record.channel_type,
            recipient = %mask_recipient(recipient),
            otp_id = %record.uid,
            "OTP verified"
        );

        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "otp.verified",
                node_types::CHANNEL_OTP,
                &record.uid,
                &did,
                serde_json::json!({
                    "channel": record.channel_type.as_str(),
                    "purpose": record.purpose,
                }),
            )
            .await;

        Ok(OtpVerification::Verified {
            channel_type: record.channel_type,
            channel_did: did,
        })
    }

    /// Draw a uniform six-digit code from the CSPRNG.
    fn generate_code(&self) -> String {
        let code: u32 = rand::rngs::OsRng.gen_range(100_000..=999_999);
        format!("{code:06}")
    }

    async fn audit_verify_failure(&self, recipient: &str, reason: &str) {
        tracing::warn!(
            recipient = %mask_recipient(recipient),
            reason,
            "OTP verification failed"
        );
        self.audit
            .emit(
                audit_categories::AUTHENTICATION,
                "otp.verify_failed",
                node_types::CHANNEL_OTP,
                "",
                "system",
                serde_json::json!({ "reason": reason }),
            )
            .await;
    }
}

/// Dispatch template for a channel.
const fn template_for(channel_type: ChannelType) -> &'static str {
    match channel_type {
        ChannelType::Email => templates::OTP_EMAIL,
        ChannelType::Sms => templates::OTP_SMS,
        ChannelType::Whatsapp => templates::OTP_WHATSAPP,
        ChannelType::Telegram => templates::OTP_TELEGRAM,
    }
}

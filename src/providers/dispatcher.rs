//! Outbound message dispatcher trait.

use crate::error::Result;
use crate::state::ChannelType;

/// Receipt returned by a dispatch attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    /// Provider-assigned message identifier.
    pub message_id: String,

    /// Whether the provider accepted the message.
    pub delivered: bool,

    /// Provider error text when `delivered` is false.
    pub error: Option<String>,
}

/// Outbound message dispatcher.
///
/// Abstracts the email/SMS/push provider behind one send operation.
/// Dispatch is idempotent with respect to caller retries only within
/// the provider's own dedup window; the core never retries
/// automatically — a failed OTP delivery is reported to the caller
/// while the stored record survives for audit and manual re-delivery.
pub trait MessageDispatcher: Send + Sync {
    /// Send a templated message to `recipient` over `channel`.
    ///
    /// `variables` is a JSON object substituted into the template
    /// (e.g. `{"code": "123456", "expires_minutes": "5"}`).
    ///
    /// A provider-side rejection is an `Ok` receipt with
    /// `delivered = false`; `Err` is reserved for transport failures
    /// that never reached the provider.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Dispatch`] on transport failure.
    ///
    /// [`CoreError::Dispatch`]: crate::error::CoreError::Dispatch
    async fn dispatch(
        &self,
        channel: ChannelType,
        recipient: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<DispatchReceipt>;
}

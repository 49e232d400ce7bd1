//! Console dispatcher for development and testing.

use crate::error::Result;
use crate::providers::{DispatchReceipt, MessageDispatcher};
use crate::state::ChannelType;
use tracing::info;

/// Console dispatcher.
///
/// Logs messages instead of sending them. Useful for development
/// where no messaging provider is configured.
///
/// **WARNING**: logs the code in plaintext; never use in production.
#[derive(Clone, Debug, Default)]
pub struct ConsoleDispatcher;

impl ConsoleDispatcher {
    /// Create a new console dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MessageDispatcher for ConsoleDispatcher {
    async fn dispatch(
        &self,
        channel: ChannelType,
        recipient: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<DispatchReceipt> {
        info!(
            channel = %channel,
            to = %recipient,
            template = template_id,
            variables = %variables,
            "📨 dispatch (development mode)"
        );

        Ok(DispatchReceipt {
            message_id: format!("console-{}", uuid::Uuid::new_v4()),
            delivered: true,
            error: None,
        })
    }
}
